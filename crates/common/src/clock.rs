//! Injected time source.
//!
//! Reservation deadlines and the expiry sweep read time through [`Clock`]
//! so tests can advance simulated time instead of sleeping.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same instant, so advancing one handle is visible
/// through every store holding another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = deadline(*now, by);
    }

    /// Sets the clock to an explicit instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Returns `from + ttl`, saturating at the largest representable instant.
pub fn deadline(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    from.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_all_clones() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let other = clock.clone();

        clock.advance(Duration::from_secs(5));

        assert_eq!(other.now(), start + TimeDelta::seconds(5));
    }

    #[test]
    fn deadline_saturates_instead_of_overflowing() {
        let at = deadline(Utc::now(), Duration::from_secs(u64::MAX));
        assert_eq!(at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn arc_clock_delegates() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH);
    }
}
