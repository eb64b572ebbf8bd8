//! Checkout timing configuration.

use std::time::Duration;

/// Timing knobs for the checkout protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Reservation TTL.
    pub checkout_window: Duration,
    /// Upper bound on a payment authorization.
    pub payment_timeout: Duration,
}

impl CheckoutConfig {
    pub fn new(checkout_window: Duration, payment_timeout: Duration) -> Self {
        Self {
            checkout_window,
            payment_timeout,
        }
    }

    /// Age after which a Pending order with no live checkout is abandoned.
    pub fn abandon_after(&self) -> Duration {
        self.checkout_window.saturating_add(self.payment_timeout)
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            checkout_window: Duration::from_secs(900),
            payment_timeout: Duration::from_secs(30),
        }
    }
}
