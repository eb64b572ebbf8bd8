//! Checkout against a shared, contended inventory.
//!
//! The [`OrderCoordinator`] drives one checkout end to end:
//! 1. Validate the request and freeze catalog prices
//! 2. Reserve stock per product, in ascending product order
//! 3. Authorize payment under a timeout
//! 4. Commit every reservation, or release them all
//!
//! If any step fails, reservations already taken are released
//! earliest-first and the order is recorded with the failure reason.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod request;
pub mod services;

pub use config::CheckoutConfig;
pub use coordinator::OrderCoordinator;
pub use error::{CheckoutError, Result};
pub use request::{CheckoutLine, CheckoutRequest};
pub use services::{InMemoryPaymentGateway, PaymentGateway, PaymentOutcome};
