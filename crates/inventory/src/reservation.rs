//! Reservation record and its state machine.

use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use common::{ProductId, ReservationId};
use serde::{Deserialize, Serialize};

/// The state of a reservation.
///
/// State transitions:
/// ```text
/// Held ──┬──► Committed
///        ├──► Released
///        └──► Expired
/// ```
/// Every transition leaves `Held` and every target is terminal, so a
/// reservation changes state at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ReservationState {
    /// Stock is deducted and awaiting commit or release.
    #[default]
    Held = 0,

    /// The deduction is permanent (terminal state).
    Committed = 1,

    /// Released by the caller, stock restored (terminal state).
    Released = 2,

    /// Released by the expiry sweep, stock restored (terminal state).
    Expired = 3,
}

impl ReservationState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationState::Held)
    }

    /// Returns true if the reservation's quantity is deducted from the ledger.
    pub fn holds_stock(&self) -> bool {
        matches!(self, ReservationState::Held | ReservationState::Committed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Held => "Held",
            ReservationState::Committed => "Committed",
            ReservationState::Released => "Released",
            ReservationState::Expired => "Expired",
        }
    }

    const fn decode(raw: u8) -> Self {
        // Only values written through `as u8` on this enum are ever stored.
        match raw {
            0 => ReservationState::Held,
            1 => ReservationState::Committed,
            2 => ReservationState::Released,
            _ => ReservationState::Expired,
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Held" => Ok(ReservationState::Held),
            "Committed" => Ok(ReservationState::Committed),
            "Released" => Ok(ReservationState::Released),
            "Expired" => Ok(ReservationState::Expired),
            other => Err(format!("unknown reservation state '{other}'")),
        }
    }
}

/// A time-bounded hold against the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Returns true once the checkout window has closed.
    ///
    /// Commit and the expiry sweep use this same predicate, so a reservation
    /// the sweep would skip is always still committable.
    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-memory reservation whose state is the only mutable field.
///
/// Transitions out of `Held` go through a single `compare_exchange`, which
/// picks exactly one winner among commit, release and expiry.
#[derive(Debug)]
pub(crate) struct ReservationSlot {
    reservation_id: ReservationId,
    product_id: ProductId,
    quantity: u32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    state: AtomicU8,
}

impl ReservationSlot {
    pub(crate) fn held(
        product_id: ProductId,
        quantity: u32,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reservation_id: ReservationId::new(),
            product_id,
            quantity,
            created_at,
            expires_at,
            state: AtomicU8::new(ReservationState::Held as u8),
        }
    }

    pub(crate) fn id(&self) -> ReservationId {
        self.reservation_id
    }

    pub(crate) fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub(crate) fn quantity(&self) -> u32 {
        self.quantity
    }

    pub(crate) fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub(crate) fn state(&self) -> ReservationState {
        ReservationState::decode(self.state.load(Ordering::Acquire))
    }

    /// Moves `Held` to `target`, or reports the state that won instead.
    pub(crate) fn leave_held(
        &self,
        target: ReservationState,
    ) -> std::result::Result<(), ReservationState> {
        self.state
            .compare_exchange(
                ReservationState::Held as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(ReservationState::decode)
    }

    pub(crate) fn snapshot(&self) -> Reservation {
        Reservation {
            reservation_id: self.reservation_id,
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            state: self.state(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn slot() -> ReservationSlot {
        let now = Utc::now();
        ReservationSlot::held(ProductId::new("SKU-001"), 2, now, now + TimeDelta::seconds(60))
    }

    #[test]
    fn test_default_state_is_held() {
        assert_eq!(ReservationState::default(), ReservationState::Held);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ReservationState::Held.is_terminal());
        assert!(ReservationState::Committed.is_terminal());
        assert!(ReservationState::Released.is_terminal());
        assert!(ReservationState::Expired.is_terminal());
    }

    #[test]
    fn test_holds_stock() {
        assert!(ReservationState::Held.holds_stock());
        assert!(ReservationState::Committed.holds_stock());
        assert!(!ReservationState::Released.holds_stock());
        assert!(!ReservationState::Expired.holds_stock());
    }

    #[test]
    fn test_parse_round_trips_names() {
        for state in [
            ReservationState::Held,
            ReservationState::Committed,
            ReservationState::Released,
            ReservationState::Expired,
        ] {
            assert_eq!(state.as_str().parse::<ReservationState>(), Ok(state));
        }
        assert!("Pending".parse::<ReservationState>().is_err());
    }

    #[test]
    fn test_leave_held_only_once() {
        let slot = slot();

        assert!(slot.leave_held(ReservationState::Committed).is_ok());
        assert_eq!(
            slot.leave_held(ReservationState::Expired),
            Err(ReservationState::Committed)
        );
        assert_eq!(slot.state(), ReservationState::Committed);
    }

    #[test]
    fn test_concurrent_transitions_have_one_winner() {
        let slot = std::sync::Arc::new(slot());
        let targets = [
            ReservationState::Committed,
            ReservationState::Released,
            ReservationState::Expired,
        ];

        let handles: Vec<_> = (0..30)
            .map(|i| {
                let slot = slot.clone();
                let target = targets[i % targets.len()];
                std::thread::spawn(move || slot.leave_held(target).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(slot.state().is_terminal());
    }

    #[test]
    fn test_is_past_ttl_boundary() {
        let reservation = slot().snapshot();
        assert!(!reservation.is_past_ttl(reservation.created_at));
        assert!(reservation.is_past_ttl(reservation.expires_at));
    }
}
