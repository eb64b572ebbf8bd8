//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, OrderId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Result of a payment authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentOutcome {
    Approved,
    Declined,
    Timeout,
}

/// Opaque payment gateway.
///
/// Implementations must be idempotent per `order_id`: authorizing the same
/// order again returns the first outcome without charging twice.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorizes `amount` for an order.
    async fn authorize(&self, order_id: OrderId, amount: Money) -> PaymentOutcome;
}

#[derive(Debug)]
struct InMemoryPaymentState {
    outcome: PaymentOutcome,
    delay: Option<Duration>,
    authorizations: HashMap<OrderId, (Money, PaymentOutcome)>,
    calls: usize,
}

impl Default for InMemoryPaymentState {
    fn default() -> Self {
        Self {
            outcome: PaymentOutcome::Approved,
            delay: None,
            authorizations: HashMap::new(),
            calls: 0,
        }
    }
}

/// Scripted in-memory payment gateway for tests and local runs.
///
/// Approves by default. The outcome and an artificial latency can be changed
/// at any time; each order keeps the outcome it first received.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a gateway that approves every authorization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outcome returned for orders not yet authorized.
    pub fn set_outcome(&self, outcome: PaymentOutcome) {
        self.state.lock().outcome = outcome;
    }

    /// Delays every new authorization by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Returns how many times `authorize` was called.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    /// Returns the recorded amount and outcome for an order.
    pub fn authorization(&self, order_id: OrderId) -> Option<(Money, PaymentOutcome)> {
        self.state.lock().authorizations.get(&order_id).copied()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authorize(&self, order_id: OrderId, amount: Money) -> PaymentOutcome {
        let delay = {
            let mut state = self.state.lock();
            state.calls += 1;
            if let Some((_, outcome)) = state.authorizations.get(&order_id) {
                return *outcome;
            }
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let outcome = state.outcome;
        state
            .authorizations
            .entry(order_id)
            .or_insert((amount, outcome))
            .1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_approves_by_default() {
        let gateway = InMemoryPaymentGateway::new();
        let order_id = OrderId::new();

        let outcome = gateway.authorize(order_id, Money::from_cents(5000)).await;
        assert_eq!(outcome, PaymentOutcome::Approved);
        assert_eq!(
            gateway.authorization(order_id),
            Some((Money::from_cents(5000), PaymentOutcome::Approved))
        );
    }

    #[tokio::test]
    async fn test_first_outcome_sticks_per_order() {
        let gateway = InMemoryPaymentGateway::new();
        let order_id = OrderId::new();
        gateway.set_outcome(PaymentOutcome::Declined);
        assert_eq!(
            gateway.authorize(order_id, Money::from_cents(100)).await,
            PaymentOutcome::Declined
        );

        gateway.set_outcome(PaymentOutcome::Approved);
        assert_eq!(
            gateway.authorize(order_id, Money::from_cents(100)).await,
            PaymentOutcome::Declined
        );
        assert_eq!(
            gateway.authorize(OrderId::new(), Money::from_cents(100)).await,
            PaymentOutcome::Approved
        );
        assert_eq!(gateway.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_delay(Some(Duration::from_secs(5)));

        let started = tokio::time::Instant::now();
        gateway.authorize(OrderId::new(), Money::from_cents(1)).await;
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
