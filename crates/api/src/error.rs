//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use chrono::{DateTime, Utc};
use domain::CatalogError;
use inventory::InventoryError;
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Checkout protocol error.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    /// Catalog read or write error.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Stock ledger error.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

/// Error body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
    pub messages: Vec<String>,
    pub date: DateTime<Utc>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Checkout(err) => checkout_error_status(err),
            ApiError::Catalog(CatalogError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Catalog(CatalogError::InvalidPrice { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Inventory(err) if err.is_business() => StatusCode::BAD_REQUEST,
            ApiError::Inventory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn checkout_error_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CheckoutError::ProductUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutError::InsufficientStock { .. }
        | CheckoutError::CheckoutInProgress(_)
        | CheckoutError::Cancelled(_)
        | CheckoutError::Abandoned(_)
        | CheckoutError::NotCancellable { .. } => StatusCode::CONFLICT,
        CheckoutError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::PaymentTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CheckoutError::ReservationExpired(_) => StatusCode::GONE,
        CheckoutError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::PartialCommitFault(_) | CheckoutError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = ErrorBody {
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            messages: vec![message],
            date: Utc::now(),
        };
        (status, axum::Json(body)).into_response()
    }
}
