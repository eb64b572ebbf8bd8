use async_trait::async_trait;
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Stock counter for a single product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ProductId,

    /// Units currently available for new reservations. Never negative.
    pub available_quantity: u64,

    /// Bumped on every successful mutation, so callers caching a read can
    /// tell whether it is stale.
    pub version: u64,
}

/// Authoritative per-product stock store.
///
/// Mutations on one product are linearizable; mutations on different
/// products never contend with each other. During checkout only a
/// [`ReservationStore`](crate::ReservationStore) calls the mutating methods.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Decrements the available quantity by `quantity` if at least that much
    /// is available.
    ///
    /// Fails with `InsufficientStock` and changes nothing otherwise.
    async fn try_decrement(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord>;

    /// Restores `quantity` units.
    ///
    /// Not idempotent: the caller guarantees each deduction is restored at
    /// most once.
    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord>;

    /// Returns the available quantity. May be stale by the time it returns;
    /// use it for display only.
    async fn current_quantity(&self, product_id: &ProductId) -> Result<u64>;

    /// Returns the full stock record, or `None` for an unknown product.
    async fn stock_record(&self, product_id: &ProductId) -> Result<Option<StockRecord>>;

    /// Adds stock, creating the product's record if it doesn't exist.
    async fn restock(&self, product_id: &ProductId, quantity: u64) -> Result<StockRecord>;
}
