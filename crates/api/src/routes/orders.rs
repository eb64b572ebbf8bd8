//! Checkout and order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::CheckoutRequest;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::Order;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub state: String,
    pub lines: Vec<OrderLineResponse>,
    pub total_cents: i64,
    pub reservation_ids: Vec<String>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub snapshot_version: u64,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub order_id: String,
    pub status: &'static str,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id.to_string(),
            state: order.state.to_string(),
            lines: order
                .lines
                .into_iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                    snapshot_version: line.snapshot_version,
                })
                .collect(),
            total_cents: order.total_amount.cents(),
            reservation_ids: order
                .reservation_ids
                .iter()
                .map(ToString::to_string)
                .collect(),
            failure: order.failure.map(|reason| reason.to_string()),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    uuid::Uuid::parse_str(id)
        .map(OrderId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}

// -- Handlers --

/// POST /checkout: reserve, pay and confirm in one call.
#[tracing::instrument(skip(state, req))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state.coordinator.checkout(req).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: read an order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.coordinator.order(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/cancel: cancel a checkout still waiting on payment.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    let order_id = parse_order_id(&id)?;
    state.coordinator.cancel(order_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            order_id: order_id.to_string(),
            status: "cancellation_requested",
        }),
    ))
}
