//! Read-only price and availability source for checkout.
//!
//! Entries are read once at reservation time and copied into the order line,
//! so later price changes never affect an order in progress.

mod memory;
mod postgres;

pub use memory::InMemoryCatalog;
pub use postgres::PostgresCatalog;

use async_trait::async_trait;
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A product's price and availability at a given snapshot version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub price: Money,
    pub is_active: bool,
    pub snapshot_version: u64,
}

/// Errors from catalog reads and writes.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Invalid price for {product_id}: {price} (must not be negative)")]
    InvalidPrice { product_id: ProductId, price: Money },

    #[error("Corrupted catalog row: {0}")]
    Corrupted(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Lookup used by the checkout coordinator.
#[async_trait]
pub trait CatalogSnapshot: Send + Sync {
    /// Returns the current entry, or `NotFound`.
    async fn lookup(&self, product_id: &ProductId) -> CatalogResult<CatalogEntry>;
}

/// Administrative writes to the catalog.
#[async_trait]
pub trait CatalogAdmin: CatalogSnapshot {
    /// Creates or replaces an entry, bumping its snapshot version.
    async fn upsert(
        &self,
        product_id: &ProductId,
        price: Money,
        is_active: bool,
    ) -> CatalogResult<CatalogEntry>;

    /// Changes the given fields of an existing entry in one step, bumping its
    /// snapshot version. Fields left as `None` keep their current value.
    async fn update(
        &self,
        product_id: &ProductId,
        price: Option<Money>,
        is_active: Option<bool>,
    ) -> CatalogResult<CatalogEntry>;
}

fn validate_price(product_id: &ProductId, price: Money) -> CatalogResult<()> {
    if price.is_negative() {
        return Err(CatalogError::InvalidPrice {
            product_id: product_id.clone(),
            price,
        });
    }
    Ok(())
}
