//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::CheckoutConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `CHECKOUT_WINDOW_SECS`: reservation TTL (default: `900`)
/// - `PAYMENT_TIMEOUT_SECS`: payment authorization bound (default: `30`)
/// - `SWEEP_INTERVAL_MS`: expiry sweep period (default: `1000`)
/// - `RECONCILE_INTERVAL_SECS`: abandoned-order scan period (default: `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub checkout_window_secs: u64,
    pub payment_timeout_secs: u64,
    pub sweep_interval_ms: u64,
    pub reconcile_interval_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("HOST", defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: env_or("RUST_LOG", defaults.log_level),
            checkout_window_secs: env_or("CHECKOUT_WINDOW_SECS", defaults.checkout_window_secs),
            payment_timeout_secs: env_or("PAYMENT_TIMEOUT_SECS", defaults.payment_timeout_secs),
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            reconcile_interval_secs: env_or(
                "RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval_secs,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Timing knobs handed to the checkout coordinator.
    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig::new(
            Duration::from_secs(self.checkout_window_secs),
            Duration::from_secs(self.payment_timeout_secs),
        )
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            checkout_window_secs: 900,
            payment_timeout_secs: 30,
            sweep_interval_ms: 1000,
            reconcile_interval_secs: 60,
        }
    }
}
