//! Product registration and stock display endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, ProductId};
use domain::{CatalogAdmin, CatalogEntry, CatalogSnapshot};
use inventory::InventoryLedger;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub product_id: String,
    pub price_cents: i64,
    #[serde(default)]
    pub stock: u64,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

fn active_by_default() -> bool {
    true
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    pub price_cents: Option<i64>,
    pub is_active: Option<bool>,
    /// Units to add to the available quantity.
    #[serde(default)]
    pub restock: u64,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub product_id: String,
    pub price_cents: i64,
    pub is_active: bool,
    pub snapshot_version: u64,
    pub available_quantity: u64,
}

impl ProductResponse {
    fn new(entry: CatalogEntry, available_quantity: u64) -> Self {
        Self {
            product_id: entry.product_id.to_string(),
            price_cents: entry.price.cents(),
            is_active: entry.is_active,
            snapshot_version: entry.snapshot_version,
            available_quantity,
        }
    }
}

async fn available(state: &AppState, product_id: &ProductId) -> Result<u64, ApiError> {
    Ok(state
        .ledger
        .stock_record(product_id)
        .await?
        .map_or(0, |record| record.available_quantity))
}

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    let product_id = ProductId::new(id);
    if product_id.is_blank() {
        return Err(ApiError::BadRequest("product_id must not be empty".to_string()));
    }
    Ok(product_id)
}

// -- Handlers --

/// POST /products: register a product with its price and opening stock.
#[tracing::instrument(skip(state, req), fields(product_id = %req.product_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product_id = parse_product_id(&req.product_id)?;

    let entry = state
        .catalog
        .upsert(&product_id, Money::from_cents(req.price_cents), req.is_active)
        .await?;
    let record = state.ledger.restock(&product_id, req.stock).await?;

    tracing::info!(stock = record.available_quantity, "product registered");
    Ok((
        StatusCode::CREATED,
        Json(ProductResponse::new(entry, record.available_quantity)),
    ))
}

/// PUT /products/{id}: change price or availability, optionally add stock.
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;

    let entry = state
        .catalog
        .update(
            &product_id,
            req.price_cents.map(Money::from_cents),
            req.is_active,
        )
        .await?;
    if req.restock > 0 {
        state.ledger.restock(&product_id, req.restock).await?;
    }

    let available_quantity = available(&state, &product_id).await?;
    Ok(Json(ProductResponse::new(entry, available_quantity)))
}

/// DELETE /products/{id}: withdraw a product from sale.
///
/// The entry is deactivated rather than removed, so orders that already froze
/// its price still resolve. Stock on hand is left untouched.
#[tracing::instrument(skip(state))]
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id = parse_product_id(&id)?;
    let entry = state.catalog.update(&product_id, None, Some(false)).await?;

    tracing::info!(snapshot_version = entry.snapshot_version, "product deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /products/{id}: catalog entry plus the current available quantity.
///
/// The quantity is a display snapshot and may be stale by the time a
/// checkout runs.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let entry = state.catalog.lookup(&product_id).await?;
    let available_quantity = available(&state, &product_id).await?;
    Ok(Json(ProductResponse::new(entry, available_quantity)))
}
