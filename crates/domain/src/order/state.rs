//! Order state machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Confirmed
///           ├──► Failed
///           └──► Cancelled
/// ```
///
/// An order that never got its stock is recorded directly as `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderState {
    /// Stock is reserved, payment outcome not yet applied.
    #[default]
    Pending,

    /// Every reservation was committed (terminal state).
    Confirmed,

    /// Checkout did not complete; the failure reason is recorded (terminal state).
    Failed,

    /// Checkout was cancelled while in flight (terminal state).
    Cancelled,
}

impl OrderState {
    /// Returns true if the order can be confirmed in this state.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderState::Pending)
    }

    /// Returns true if the order can be marked failed in this state.
    pub fn can_fail(&self) -> bool {
        matches!(self, OrderState::Pending)
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderState::Pending)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderState::Pending)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "Pending",
            OrderState::Confirmed => "Confirmed",
            OrderState::Failed => "Failed",
            OrderState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderState::Pending),
            "Confirmed" => Ok(OrderState::Confirmed),
            "Failed" => Ok(OrderState::Failed),
            "Cancelled" => Ok(OrderState::Cancelled),
            other => Err(format!("unknown order state: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_pending() {
        assert_eq!(OrderState::default(), OrderState::Pending);
    }

    #[test]
    fn test_only_pending_can_transition() {
        for state in [
            OrderState::Confirmed,
            OrderState::Failed,
            OrderState::Cancelled,
        ] {
            assert!(!state.can_confirm());
            assert!(!state.can_fail());
            assert!(!state.can_cancel());
            assert!(state.is_terminal());
        }

        let pending = OrderState::Pending;
        assert!(pending.can_confirm());
        assert!(pending.can_fail());
        assert!(pending.can_cancel());
        assert!(!pending.is_terminal());
    }

    #[test]
    fn test_parse_round_trips_display() {
        for state in [
            OrderState::Pending,
            OrderState::Confirmed,
            OrderState::Failed,
            OrderState::Cancelled,
        ] {
            assert_eq!(state.to_string().parse::<OrderState>().unwrap(), state);
        }
        assert!("Shipped".parse::<OrderState>().is_err());
    }
}
