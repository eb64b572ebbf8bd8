//! The order record kept by the checkout coordinator.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderState};

/// A purchased product with the price frozen at reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    /// Catalog snapshot version the price was read from.
    pub snapshot_version: u64,
}

impl OrderLine {
    /// Returns `unit_price * quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// Why an order did not reach `Confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FailureReason {
    InsufficientStock { product_id: ProductId },
    PaymentDeclined,
    PaymentTimeout,
    ReservationExpired,
    /// Some reservations were committed before another one failed.
    PartialCommitFault {
        committed: Vec<ReservationId>,
        failed: ReservationId,
    },
    Cancelled,
    /// Left Pending by a crashed checkout and reconciled later.
    Abandoned,
}

impl FailureReason {
    /// Short label, used as a metrics dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InsufficientStock { .. } => "insufficient_stock",
            FailureReason::PaymentDeclined => "payment_declined",
            FailureReason::PaymentTimeout => "payment_timeout",
            FailureReason::ReservationExpired => "reservation_expired",
            FailureReason::PartialCommitFault { .. } => "partial_commit_fault",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order and the reservations backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
    pub total_amount: Money,
    pub state: OrderState,
    pub reservation_ids: Vec<ReservationId>,
    pub failure: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every state change; repositories use it for optimistic
    /// concurrency.
    pub version: u64,
}

impl Order {
    /// Creates a Pending order whose lines are backed by `reservation_ids`.
    pub fn pending(
        order_id: OrderId,
        lines: Vec<OrderLine>,
        reservation_ids: Vec<ReservationId>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let total_amount = Self::total_of(&lines)?;
        Ok(Self {
            order_id,
            lines,
            total_amount,
            state: OrderState::Pending,
            reservation_ids,
            failure: None,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    /// Creates an order that failed before any stock was held.
    pub fn rejected(
        order_id: OrderId,
        lines: Vec<OrderLine>,
        reason: FailureReason,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let mut order = Self::pending(order_id, lines, Vec::new(), now)?;
        order.state = OrderState::Failed;
        order.failure = Some(reason);
        Ok(order)
    }

    /// Sums line totals, rejecting empty orders and zero quantities.
    pub fn total_of(lines: &[OrderLine]) -> Result<Money, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::NoLines);
        }

        lines.iter().try_fold(Money::zero(), |total, line| {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                });
            }
            line.line_total()
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or(OrderError::TotalOverflow)
        })
    }

    /// Pending → Confirmed.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure(self.state.can_confirm(), "confirm")?;
        self.transition(OrderState::Confirmed, None, now);
        Ok(())
    }

    /// Pending → Failed with a recorded reason.
    pub fn fail(&mut self, reason: FailureReason, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure(self.state.can_fail(), "fail")?;
        self.transition(OrderState::Failed, Some(reason), now);
        Ok(())
    }

    /// Pending → Cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure(self.state.can_cancel(), "cancel")?;
        self.transition(OrderState::Cancelled, Some(FailureReason::Cancelled), now);
        Ok(())
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> Result<(), OrderError> {
        if allowed {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action,
            })
        }
    }

    fn transition(
        &mut self,
        state: OrderState,
        failure: Option<FailureReason>,
        now: DateTime<Utc>,
    ) {
        self.state = state;
        self.failure = failure;
        self.updated_at = now;
        self.version += 1;
    }
}
