use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use parking_lot::RwLock;

use super::{OrderRepository, RepositoryError, RepositoryResult};
use crate::order::{Order, OrderState};

/// In-memory order repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Returns true if no orders are stored.
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> RepositoryResult<()> {
        match self.orders.write().entry(order.order_id) {
            Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(order.order_id)),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, order: &Order, expected_version: u64) -> RepositoryResult<()> {
        let mut orders = self.orders.write();
        let stored = orders
            .get_mut(&order.order_id)
            .ok_or(RepositoryError::NotFound(order.order_id))?;

        if stored.version != expected_version {
            tracing::warn!(
                order_id = %order.order_id,
                expected = expected_version,
                actual = stored.version,
                "order version conflict"
            );
            return Err(RepositoryError::ConcurrencyConflict {
                order_id: order.order_id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        *stored = order.clone();
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> RepositoryResult<Option<Order>> {
        Ok(self.orders.read().get(&order_id).cloned())
    }

    async fn list_pending(&self) -> RepositoryResult<Vec<Order>> {
        let mut pending: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|order| order.state == OrderState::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|order| order.created_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{FailureReason, OrderLine};
    use chrono::{Duration, Utc};
    use common::{Money, ProductId, ReservationId};

    fn order_at(offset_secs: i64) -> Order {
        Order::pending(
            OrderId::new(),
            vec![OrderLine {
                product_id: ProductId::new("SKU-001"),
                quantity: 1,
                unit_price: Money::from_cents(500),
                snapshot_version: 1,
            }],
            vec![ReservationId::new()],
            Utc::now() + Duration::seconds(offset_secs),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryOrderRepository::new();
        let order = order_at(0);

        repo.insert(&order).await.unwrap();
        assert_eq!(repo.get(order.order_id).await.unwrap(), Some(order.clone()));

        let err = repo.insert(&order).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let repo = InMemoryOrderRepository::new();
        let mut order = order_at(0);
        repo.insert(&order).await.unwrap();

        let expected = order.version;
        order.confirm(Utc::now()).unwrap();
        repo.update(&order, expected).await.unwrap();

        // A second writer still holding the old version loses.
        let mut stale = order.clone();
        stale.version = expected;
        stale.state = OrderState::Pending;
        stale.fail(FailureReason::PaymentDeclined, Utc::now()).unwrap();
        let err = repo.update(&stale, expected).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::ConcurrencyConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(
            repo.get(order.order_id).await.unwrap().unwrap().state,
            OrderState::Confirmed
        );
    }

    #[tokio::test]
    async fn test_update_unknown_order() {
        let repo = InMemoryOrderRepository::new();
        let order = order_at(0);
        let err = repo.update(&order, 1).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_pending_oldest_first() {
        let repo = InMemoryOrderRepository::new();
        let newer = order_at(10);
        let older = order_at(-10);
        let mut done = order_at(0);
        done.confirm(Utc::now()).unwrap();

        for order in [&newer, &older, &done] {
            repo.insert(order).await.unwrap();
        }

        let pending = repo.list_pending().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![older.order_id, newer.order_id]);
    }
}
