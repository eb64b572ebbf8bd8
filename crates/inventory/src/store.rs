use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ProductId, ReservationId};

use crate::{Reservation, Result};

/// Tracks time-bounded holds against the inventory ledger.
///
/// The store is the only writer of ledger quantities on the checkout path:
/// creating a reservation decrements stock, releasing or expiring one
/// restores it, and committing one makes the deduction permanent.
///
/// Commit, release and expiry race on the same reservation; exactly one of
/// them moves it out of `Held`.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Creates a Held reservation and deducts its quantity from the ledger.
    ///
    /// If the ledger refuses the decrement no reservation is created. The new
    /// reservation expires at `created_at + ttl`.
    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        ttl: Duration,
    ) -> Result<Reservation>;

    /// Moves Held to Committed. The ledger is left untouched.
    ///
    /// A reservation past its TTL yields `ReservationExpired` even if the
    /// sweep hasn't reached it yet; restoring its stock is left to the sweep.
    async fn commit(&self, reservation_id: ReservationId) -> Result<Reservation>;

    /// Moves Held to Released and restores the quantity.
    async fn release(&self, reservation_id: ReservationId) -> Result<Reservation>;

    /// Expires every Held reservation whose deadline is at or before `now`,
    /// restoring its quantity. Returns the reservations this call expired.
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Returns a snapshot of a reservation.
    async fn get(&self, reservation_id: ReservationId) -> Result<Option<Reservation>>;
}
