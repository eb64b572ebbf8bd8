//! Background expiry of reservations whose checkout window has closed.

use std::sync::Arc;
use std::time::Duration;

use common::Clock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{Reservation, ReservationStore, Result};

/// Periodically expires overdue reservations.
///
/// Time comes from the injected clock, not from the tick schedule, so tests
/// can drive expiry by advancing a [`ManualClock`](common::ManualClock) and
/// calling [`run_once`](Self::run_once).
pub struct ExpirySweeper<S> {
    store: S,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl<S> ExpirySweeper<S>
where
    S: ReservationStore + 'static,
{
    /// Creates a sweeper that scans `store` every `interval`.
    pub fn new(store: S, clock: impl Clock + 'static, interval: Duration) -> Self {
        Self {
            store,
            clock: Arc::new(clock),
            interval,
        }
    }

    /// Runs a single sweep at the clock's current time.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<Vec<Reservation>> {
        let now = self.clock.now();
        let expired = self.store.expire_due(now).await?;

        if !expired.is_empty() {
            metrics::counter!("reservations_expired_total").increment(expired.len() as u64);
            tracing::info!(count = expired.len(), "expired overdue reservations");
        }

        Ok(expired)
    }

    /// Spawns the sweep loop on the current tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::warn!(error = %e, "expiry sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::debug!("expiry sweeper stopped");
        });

        SweeperHandle { shutdown, task }
    }
}

/// Handle to a running sweep loop.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the loop and waits for the in-progress sweep, if any, to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "expiry sweeper task ended abnormally");
        }
    }
}
