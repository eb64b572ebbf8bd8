//! Order model and state machine.

mod model;
mod state;

pub use model::{FailureReason, Order, OrderLine};
pub use state::OrderState;

use common::ProductId;
use thiserror::Error;

/// Errors raised by order state transitions and validation.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderState,
        action: &'static str,
    },

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Order has no lines.
    #[error("Order has no lines")]
    NoLines,

    /// Order total does not fit in the money representation.
    #[error("Order total overflows")]
    TotalOverflow,
}
