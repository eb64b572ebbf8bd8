//! Checkout error types.

use common::{OrderId, ProductId};
use domain::{FailureReason, OrderState, RepositoryError};
use thiserror::Error;

/// Errors returned by the checkout coordinator.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request is malformed.
    #[error("Invalid checkout request: {0}")]
    InvalidRequest(String),

    /// The product is unknown or not for sale.
    #[error("Product unavailable: {0}")]
    ProductUnavailable(ProductId),

    /// Not enough stock to reserve a line.
    #[error("Insufficient stock for {product_id} (order {order_id})")]
    InsufficientStock {
        order_id: OrderId,
        product_id: ProductId,
    },

    /// The payment gateway declined the charge.
    #[error("Payment declined for order {0}")]
    PaymentDeclined(OrderId),

    /// The payment gateway did not answer in time.
    #[error("Payment timed out for order {0}")]
    PaymentTimeout(OrderId),

    /// A reservation lapsed before it could be committed.
    #[error("Reservation expired before commit (order {0})")]
    ReservationExpired(OrderId),

    /// Some but not all reservations were committed.
    #[error("Partial commit fault on order {0}")]
    PartialCommitFault(OrderId),

    /// The checkout was cancelled before payment returned.
    #[error("Checkout cancelled for order {0}")]
    Cancelled(OrderId),

    /// The order was left behind by an interrupted checkout and reconciled.
    #[error("Checkout abandoned for order {0}")]
    Abandoned(OrderId),

    /// Another checkout for the same order id has not finished.
    #[error("Checkout already in progress for order {0}")]
    CheckoutInProgress(OrderId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order is no longer in flight.
    #[error("Order {order_id} cannot be cancelled in {state} state")]
    NotCancellable { order_id: OrderId, state: OrderState },

    /// A storage backend failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl CheckoutError {
    /// Rebuilds the error a finished checkout ended with.
    pub fn from_failure(order_id: OrderId, reason: &FailureReason) -> Self {
        match reason {
            FailureReason::InsufficientStock { product_id } => CheckoutError::InsufficientStock {
                order_id,
                product_id: product_id.clone(),
            },
            FailureReason::PaymentDeclined => CheckoutError::PaymentDeclined(order_id),
            FailureReason::PaymentTimeout => CheckoutError::PaymentTimeout(order_id),
            FailureReason::ReservationExpired => CheckoutError::ReservationExpired(order_id),
            FailureReason::PartialCommitFault { .. } => CheckoutError::PartialCommitFault(order_id),
            FailureReason::Cancelled => CheckoutError::Cancelled(order_id),
            FailureReason::Abandoned => CheckoutError::Abandoned(order_id),
        }
    }

    /// Short label, used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::InvalidRequest(_) => "invalid_request",
            CheckoutError::ProductUnavailable(_) => "product_unavailable",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::PaymentDeclined(_) => "payment_declined",
            CheckoutError::PaymentTimeout(_) => "payment_timeout",
            CheckoutError::ReservationExpired(_) => "reservation_expired",
            CheckoutError::PartialCommitFault(_) => "partial_commit_fault",
            CheckoutError::Cancelled(_) => "cancelled",
            CheckoutError::Abandoned(_) => "abandoned",
            CheckoutError::CheckoutInProgress(_) => "checkout_in_progress",
            CheckoutError::OrderNotFound(_) => "order_not_found",
            CheckoutError::NotCancellable { .. } => "not_cancellable",
            CheckoutError::Persistence(_) => "persistence",
        }
    }
}

impl From<RepositoryError> for CheckoutError {
    fn from(e: RepositoryError) -> Self {
        CheckoutError::Persistence(e.to_string())
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_failure_keeps_the_product() {
        let order_id = OrderId::new();
        let err = CheckoutError::from_failure(
            order_id,
            &FailureReason::InsufficientStock {
                product_id: ProductId::new("SKU-001"),
            },
        );
        match err {
            CheckoutError::InsufficientStock {
                order_id: id,
                product_id,
            } => {
                assert_eq!(id, order_id);
                assert_eq!(product_id.as_str(), "SKU-001");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_kind_matches_failure_reason_label() {
        let order_id = OrderId::new();
        for reason in [
            FailureReason::PaymentDeclined,
            FailureReason::PaymentTimeout,
            FailureReason::ReservationExpired,
            FailureReason::Cancelled,
            FailureReason::Abandoned,
        ] {
            assert_eq!(
                CheckoutError::from_failure(order_id, &reason).kind(),
                reason.as_str()
            );
        }
    }
}
