use common::{ProductId, ReservationId};
use thiserror::Error;

use crate::reservation::ReservationState;

/// Errors returned by the ledger and the reservation store.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product does not have enough available stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u64,
    },

    /// The product has no stock record.
    #[error("Product not found in ledger: {0}")]
    ProductNotFound(ProductId),

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The reservation already left the Held state.
    #[error("Reservation {reservation_id} is {actual}, expected Held")]
    InvalidState {
        reservation_id: ReservationId,
        actual: ReservationState,
    },

    /// The reservation's TTL passed before it could be committed.
    #[error("Reservation expired: {0}")]
    ReservationExpired(ReservationId),

    /// Quantities must be strictly positive.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u64),

    /// A stored row could not be decoded.
    #[error("Corrupted record: {0}")]
    Corrupted(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl InventoryError {
    /// Returns true for failures caused by the state of the data rather than
    /// the storage backend.
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            InventoryError::Database(_) | InventoryError::Migration(_) | InventoryError::Corrupted(_)
        )
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
