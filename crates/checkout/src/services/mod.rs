//! External services called during checkout.

pub mod payment;

pub use payment::{InMemoryPaymentGateway, PaymentGateway, PaymentOutcome};
