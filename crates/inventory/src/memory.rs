use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Clock, ProductId, ReservationId, deadline};
use parking_lot::{Mutex, RwLock};

use crate::reservation::ReservationSlot;
use crate::{
    InventoryError, InventoryLedger, Reservation, ReservationState, ReservationStore, Result,
    StockRecord,
};

/// In-memory inventory ledger.
///
/// Each product owns its own mutex; the outer map is only write-locked when
/// a product is first stocked, so checkouts on unrelated products never wait
/// on each other.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryLedger {
    products: Arc<RwLock<HashMap<ProductId, Arc<Mutex<StockRecord>>>>>,
}

impl InMemoryInventoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger seeded with the given stock levels.
    pub fn with_stock<I, P>(stock: I) -> Self
    where
        I: IntoIterator<Item = (P, u64)>,
        P: Into<ProductId>,
    {
        let ledger = Self::new();
        for (product_id, quantity) in stock {
            ledger.restock_now(&product_id.into(), quantity);
        }
        ledger
    }

    /// Returns the number of products with a stock record.
    pub fn product_count(&self) -> usize {
        self.products.read().len()
    }

    fn slot(&self, product_id: &ProductId) -> Result<Arc<Mutex<StockRecord>>> {
        self.products
            .read()
            .get(product_id)
            .cloned()
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))
    }

    fn try_decrement_now(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        let slot = self.slot(product_id)?;
        let mut record = slot.lock();
        let requested = u64::from(quantity);

        if record.available_quantity < requested {
            return Err(InventoryError::InsufficientStock {
                product_id: product_id.clone(),
                requested,
                available: record.available_quantity,
            });
        }

        record.available_quantity -= requested;
        record.version += 1;
        Ok(record.clone())
    }

    fn increment_now(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        let slot = self.slot(product_id)?;
        let mut record = slot.lock();
        record.available_quantity = record.available_quantity.saturating_add(u64::from(quantity));
        record.version += 1;
        Ok(record.clone())
    }

    fn restock_now(&self, product_id: &ProductId, quantity: u64) -> StockRecord {
        let slot = {
            let mut products = self.products.write();
            products
                .entry(product_id.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(StockRecord {
                        product_id: product_id.clone(),
                        available_quantity: 0,
                        version: 0,
                    }))
                })
                .clone()
        };

        let mut record = slot.lock();
        record.available_quantity = record.available_quantity.saturating_add(quantity);
        record.version += 1;
        record.clone()
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    async fn try_decrement(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.try_decrement_now(product_id, quantity)
    }

    async fn increment(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.increment_now(product_id, quantity)
    }

    async fn current_quantity(&self, product_id: &ProductId) -> Result<u64> {
        Ok(self.slot(product_id)?.lock().available_quantity)
    }

    async fn stock_record(&self, product_id: &ProductId) -> Result<Option<StockRecord>> {
        Ok(self
            .products
            .read()
            .get(product_id)
            .map(|slot| slot.lock().clone()))
    }

    async fn restock(&self, product_id: &ProductId, quantity: u64) -> Result<StockRecord> {
        Ok(self.restock_now(product_id, quantity))
    }
}

#[derive(Debug, Default)]
struct ReservationIndex {
    reservations: RwLock<HashMap<ReservationId, Arc<ReservationSlot>>>,
    /// Deadline-ordered queue drained by the sweep.
    expiry_queue: Mutex<BTreeSet<(DateTime<Utc>, ReservationId)>>,
}

/// In-memory reservation store over any [`InventoryLedger`].
#[derive(Clone)]
pub struct InMemoryReservationStore<L: InventoryLedger> {
    ledger: L,
    clock: Arc<dyn Clock>,
    index: Arc<ReservationIndex>,
}

impl<L: InventoryLedger> InMemoryReservationStore<L> {
    /// Creates a store that mutates `ledger` and reads time from `clock`.
    pub fn new(ledger: L, clock: impl Clock + 'static) -> Self {
        Self {
            ledger,
            clock: Arc::new(clock),
            index: Arc::default(),
        }
    }

    /// Returns the ledger this store mutates.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns the number of reservations in the given state.
    pub fn count_in_state(&self, state: ReservationState) -> usize {
        self.index
            .reservations
            .read()
            .values()
            .filter(|slot| slot.state() == state)
            .count()
    }

    fn slot(&self, reservation_id: ReservationId) -> Result<Arc<ReservationSlot>> {
        self.index
            .reservations
            .read()
            .get(&reservation_id)
            .cloned()
            .ok_or(InventoryError::ReservationNotFound(reservation_id))
    }

    fn drain_due(&self, now: DateTime<Utc>) -> Vec<ReservationId> {
        let mut queue = self.index.expiry_queue.lock();
        let mut due = Vec::new();
        while let Some(&(expires_at, reservation_id)) = queue.first() {
            if expires_at > now {
                break;
            }
            queue.pop_first();
            due.push(reservation_id);
        }
        due
    }
}

#[async_trait]
impl<L: InventoryLedger> ReservationStore for InMemoryReservationStore<L> {
    #[tracing::instrument(skip(self))]
    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        ttl: Duration,
    ) -> Result<Reservation> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity(0));
        }

        self.ledger.try_decrement(product_id, quantity).await?;

        let now = self.clock.now();
        let slot = Arc::new(ReservationSlot::held(
            product_id.clone(),
            quantity,
            now,
            deadline(now, ttl),
        ));
        let reservation = slot.snapshot();

        // Indexed before queued, so the sweep never pops an id it can't find.
        self.index
            .reservations
            .write()
            .insert(slot.id(), slot.clone());
        self.index
            .expiry_queue
            .lock()
            .insert((slot.expires_at(), slot.id()));

        tracing::debug!(reservation_id = %reservation.reservation_id, "reservation held");
        Ok(reservation)
    }

    #[tracing::instrument(skip(self))]
    async fn commit(&self, reservation_id: ReservationId) -> Result<Reservation> {
        let slot = self.slot(reservation_id)?;

        match slot.state() {
            ReservationState::Expired => {
                return Err(InventoryError::ReservationExpired(reservation_id));
            }
            ReservationState::Held if self.clock.now() >= slot.expires_at() => {
                return Err(InventoryError::ReservationExpired(reservation_id));
            }
            _ => {}
        }

        slot.leave_held(ReservationState::Committed)
            .map_err(|actual| match actual {
                ReservationState::Expired => InventoryError::ReservationExpired(reservation_id),
                actual => InventoryError::InvalidState {
                    reservation_id,
                    actual,
                },
            })?;

        Ok(slot.snapshot())
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, reservation_id: ReservationId) -> Result<Reservation> {
        let slot = self.slot(reservation_id)?;

        slot.leave_held(ReservationState::Released)
            .map_err(|actual| InventoryError::InvalidState {
                reservation_id,
                actual,
            })?;

        self.ledger
            .increment(slot.product_id(), slot.quantity())
            .await?;

        Ok(slot.snapshot())
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let mut expired = Vec::new();
        let mut first_error = None;

        for reservation_id in self.drain_due(now) {
            // Queue entries outlive commit/release; those lose the CAS below.
            let Ok(slot) = self.slot(reservation_id) else {
                continue;
            };
            if slot.leave_held(ReservationState::Expired).is_err() {
                continue;
            }

            match self
                .ledger
                .increment(slot.product_id(), slot.quantity())
                .await
            {
                Ok(_) => expired.push(slot.snapshot()),
                Err(e) => {
                    tracing::error!(%reservation_id, error = %e, "failed to restore expired stock");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(expired),
        }
    }

    async fn get(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self
            .index
            .reservations
            .read()
            .get(&reservation_id)
            .map(|slot| slot.snapshot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ManualClock;

    const TTL: Duration = Duration::from_secs(60);

    fn setup(stock: u64) -> (
        InMemoryReservationStore<InMemoryInventoryLedger>,
        InMemoryInventoryLedger,
        ManualClock,
    ) {
        let ledger = InMemoryInventoryLedger::with_stock([("SKU-001", stock)]);
        let clock = ManualClock::default();
        let store = InMemoryReservationStore::new(ledger.clone(), clock.clone());
        (store, ledger, clock)
    }

    fn sku() -> ProductId {
        ProductId::new("SKU-001")
    }

    #[tokio::test]
    async fn test_try_decrement_refuses_overdraw() {
        let ledger = InMemoryInventoryLedger::with_stock([("SKU-001", 3)]);

        let record = ledger.try_decrement(&sku(), 2).await.unwrap();
        assert_eq!(record.available_quantity, 1);

        let err = ledger.try_decrement(&sku(), 2).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock {
                requested: 2,
                available: 1,
                ..
            }
        ));
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_version_bumps_only_on_success() {
        let ledger = InMemoryInventoryLedger::with_stock([("SKU-001", 1)]);
        let before = ledger.stock_record(&sku()).await.unwrap().unwrap().version;

        ledger.try_decrement(&sku(), 1).await.unwrap();
        let _ = ledger.try_decrement(&sku(), 1).await;
        ledger.increment(&sku(), 1).await.unwrap();

        let after = ledger.stock_record(&sku()).await.unwrap().unwrap().version;
        assert_eq!(after, before + 2);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let ledger = InMemoryInventoryLedger::new();
        let err = ledger.try_decrement(&sku(), 1).await.unwrap_err();
        assert!(matches!(err, InventoryError::ProductNotFound(_)));
        assert!(ledger.stock_record(&sku()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restock_creates_and_accumulates() {
        let ledger = InMemoryInventoryLedger::new();
        ledger.restock(&sku(), 4).await.unwrap();
        let record = ledger.restock(&sku(), 6).await.unwrap();
        assert_eq!(record.available_quantity, 10);
        assert_eq!(ledger.product_count(), 1);
    }

    #[tokio::test]
    async fn test_reserve_deducts_stock() {
        let (store, ledger, clock) = setup(5);

        let reservation = store.reserve(&sku(), 2, TTL).await.unwrap();

        assert_eq!(reservation.state, ReservationState::Held);
        assert_eq!(reservation.created_at, clock.now());
        assert_eq!(reservation.expires_at, clock.now() + chrono::TimeDelta::seconds(60));
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_reserve_creates_nothing() {
        let (store, ledger, _) = setup(1);

        let err = store.reserve(&sku(), 2, TTL).await.unwrap_err();

        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
        assert_eq!(store.count_in_state(ReservationState::Held), 0);
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (store, _, _) = setup(1);
        let err = store.reserve(&sku(), 0, TTL).await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity(0)));
    }

    #[tokio::test]
    async fn test_release_restores_once() {
        let (store, ledger, _) = setup(5);
        let reservation = store.reserve(&sku(), 2, TTL).await.unwrap();

        let released = store.release(reservation.reservation_id).await.unwrap();
        assert_eq!(released.state, ReservationState::Released);
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 5);

        let err = store.release(reservation.reservation_id).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InvalidState {
                actual: ReservationState::Released,
                ..
            }
        ));
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_commit_is_permanent() {
        let (store, ledger, clock) = setup(5);
        let reservation = store.reserve(&sku(), 2, TTL).await.unwrap();

        let committed = store.commit(reservation.reservation_id).await.unwrap();
        assert_eq!(committed.state, ReservationState::Committed);

        let err = store.release(reservation.reservation_id).await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidState { .. }));

        clock.advance(TTL * 2);
        assert!(store.expire_due(clock.now()).await.unwrap().is_empty());
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_commit_twice_is_invalid_state() {
        let (store, _, _) = setup(5);
        let reservation = store.reserve(&sku(), 1, TTL).await.unwrap();

        store.commit(reservation.reservation_id).await.unwrap();
        let err = store.commit(reservation.reservation_id).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InvalidState {
                actual: ReservationState::Committed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_commit_past_ttl_leaves_restore_to_sweep() {
        let (store, ledger, clock) = setup(5);
        let reservation = store.reserve(&sku(), 2, TTL).await.unwrap();

        clock.advance(TTL);
        let err = store.commit(reservation.reservation_id).await.unwrap_err();
        assert!(matches!(err, InventoryError::ReservationExpired(_)));

        // The failed commit restored nothing.
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 3);

        let expired = store.expire_due(clock.now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].state, ReservationState::Expired);
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 5);

        let err = store.commit(reservation.reservation_id).await.unwrap_err();
        assert!(matches!(err, InventoryError::ReservationExpired(_)));
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let (store, ledger, clock) = setup(5);
        store.reserve(&sku(), 2, TTL).await.unwrap();
        store.reserve(&sku(), 1, TTL * 3).await.unwrap();

        clock.advance(TTL);
        assert_eq!(store.expire_due(clock.now()).await.unwrap().len(), 1);
        assert!(store.expire_due(clock.now()).await.unwrap().is_empty());
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 4);
        assert_eq!(store.count_in_state(ReservationState::Held), 1);
    }

    #[tokio::test]
    async fn test_release_after_expiry_is_invalid_state() {
        let (store, ledger, clock) = setup(5);
        let reservation = store.reserve(&sku(), 2, TTL).await.unwrap();

        clock.advance(TTL);
        store.expire_due(clock.now()).await.unwrap();

        let err = store.release(reservation.reservation_id).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InvalidState {
                actual: ReservationState::Expired,
                ..
            }
        ));
        assert_eq!(ledger.current_quantity(&sku()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unknown_reservation() {
        let (store, _, _) = setup(5);
        let id = ReservationId::new();
        assert!(matches!(
            store.commit(id).await.unwrap_err(),
            InventoryError::ReservationNotFound(_)
        ));
        assert!(matches!(
            store.release(id).await.unwrap_err(),
            InventoryError::ReservationNotFound(_)
        ));
        assert!(store.get(id).await.unwrap().is_none());
    }
}
