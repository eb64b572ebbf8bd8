//! Order model, catalog snapshot and order persistence.
//!
//! This crate provides:
//! - `Order` with its Pending/Confirmed/Failed/Cancelled state machine
//! - `CatalogSnapshot` for price-locked product lookups
//! - `OrderRepository` with optimistic version checks
//!
//! Each store has an in-memory and a PostgreSQL implementation.

pub mod catalog;
pub mod order;
pub mod repository;

pub use catalog::{
    CatalogAdmin, CatalogEntry, CatalogError, CatalogResult, CatalogSnapshot, InMemoryCatalog,
    PostgresCatalog,
};
pub use order::{FailureReason, Order, OrderError, OrderLine, OrderState};
pub use repository::{
    InMemoryOrderRepository, OrderRepository, PostgresOrderRepository, RepositoryError,
    RepositoryResult,
};
