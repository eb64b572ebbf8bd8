//! Order persistence.

mod memory;
mod postgres;

pub use memory::InMemoryOrderRepository;
pub use postgres::PostgresOrderRepository;

use async_trait::async_trait;
use common::OrderId;
use thiserror::Error;

use crate::order::Order;

/// Errors from order persistence.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// The stored version moved since the caller read the order.
    #[error("Concurrency conflict on {order_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },

    #[error("Corrupted order row: {0}")]
    Corrupted(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Storage for orders, owned by the checkout coordinator.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, order: &Order) -> RepositoryResult<()>;

    /// Replaces an order if its stored version equals `expected_version`.
    async fn update(&self, order: &Order, expected_version: u64) -> RepositoryResult<()>;

    /// Reads an order by id.
    async fn get(&self, order_id: OrderId) -> RepositoryResult<Option<Order>>;

    /// Lists Pending orders, oldest first.
    async fn list_pending(&self) -> RepositoryResult<Vec<Order>>;
}
