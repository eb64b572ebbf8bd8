//! Contention tests for the in-memory ledger and reservation store.
//!
//! These run on the multi-threaded runtime so reservations really race.

use std::time::Duration;

use common::{Clock, ManualClock, ProductId};
use futures_util::future::join_all;
use inventory::{
    InMemoryInventoryLedger, InMemoryReservationStore, InventoryError, InventoryLedger,
    ReservationState, ReservationStore,
};

const TTL: Duration = Duration::from_secs(300);

fn setup(
    stock: &[(&str, u64)],
) -> (
    InMemoryReservationStore<InMemoryInventoryLedger>,
    InMemoryInventoryLedger,
    ManualClock,
) {
    let ledger = InMemoryInventoryLedger::with_stock(stock.iter().map(|(p, q)| (*p, *q)));
    let clock = ManualClock::default();
    let store = InMemoryReservationStore::new(ledger.clone(), clock.clone());
    (store, ledger, clock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_reserves_never_oversell() {
    const N: u64 = 16;
    let (store, ledger, _) = setup(&[("SKU-001", N - 1)]);
    let product = ProductId::new("SKU-001");

    let tasks = (0..N).map(|_| {
        let store = store.clone();
        let product = product.clone();
        tokio::spawn(async move { store.reserve(&product, 1, TTL).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count() as u64;
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(InventoryError::InsufficientStock { .. })))
        .count() as u64;

    assert_eq!(succeeded, N - 1);
    assert_eq!(refused, 1);
    assert_eq!(ledger.current_quantity(&product).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_multi_unit_reserves_stay_within_stock() {
    const N: u32 = 6;
    let initial = u64::from(N) - 1;
    let (store, ledger, _) = setup(&[("SKU-001", initial)]);
    let product = ProductId::new("SKU-001");

    let tasks = (0..N).map(|_| {
        let store = store.clone();
        let product = product.clone();
        tokio::spawn(async move { store.reserve(&product, N, TTL).await })
    });
    let reserved: u64 = join_all(tasks)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap().ok())
        .map(|r| u64::from(r.quantity))
        .sum();

    assert!(reserved <= initial);
    assert_eq!(reserved, 0);
    assert_eq!(ledger.current_quantity(&product).await.unwrap(), initial);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn held_plus_committed_never_exceeds_initial_stock() {
    let initial = 20;
    let (store, ledger, clock) = setup(&[("SKU-001", initial)]);
    let product = ProductId::new("SKU-001");

    // Mixed workload: reserve, then commit or release depending on parity.
    let tasks = (0..40u32).map(|i| {
        let store = store.clone();
        let product = product.clone();
        tokio::spawn(async move {
            let reservation = store.reserve(&product, 1 + i % 3, TTL).await?;
            if i % 2 == 0 {
                store.commit(reservation.reservation_id).await
            } else {
                store.release(reservation.reservation_id).await
            }
        })
    });
    let committed: u64 = join_all(tasks)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap().ok())
        .filter(|r| r.state == ReservationState::Committed)
        .map(|r| u64::from(r.quantity))
        .sum();

    assert_eq!(store.count_in_state(ReservationState::Held), 0);
    assert!(committed <= initial);

    clock.advance(TTL * 2);
    assert!(store.expire_due(clock.now()).await.unwrap().is_empty());
    assert_eq!(
        ledger.current_quantity(&product).await.unwrap(),
        initial - committed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn sweep_races_commit_with_one_winner() {
    let (store, ledger, clock) = setup(&[("SKU-001", 100)]);
    let product = ProductId::new("SKU-001");

    let mut ids = Vec::new();
    for _ in 0..50 {
        ids.push(store.reserve(&product, 1, TTL).await.unwrap().reservation_id);
    }

    // Deadline passes while commits are in flight; only some may win.
    let committer = {
        let store = store.clone();
        let ids = ids.clone();
        tokio::spawn(async move {
            let mut committed = 0u64;
            for id in ids {
                if store.commit(id).await.is_ok() {
                    committed += 1;
                }
            }
            committed
        })
    };
    clock.advance(TTL);
    let swept = store.expire_due(clock.now()).await.unwrap().len() as u64;
    let committed = committer.await.unwrap();

    assert_eq!(committed + swept, 50);
    assert_eq!(
        ledger.current_quantity(&product).await.unwrap(),
        100 - committed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrelated_products_do_not_interfere() {
    let (store, ledger, _) = setup(&[("SKU-001", 1), ("SKU-002", 1)]);

    let a = {
        let store = store.clone();
        tokio::spawn(async move { store.reserve(&ProductId::new("SKU-001"), 1, TTL).await })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { store.reserve(&ProductId::new("SKU-002"), 1, TTL).await })
    };

    assert!(a.await.unwrap().is_ok());
    assert!(b.await.unwrap().is_ok());
    assert_eq!(
        ledger
            .current_quantity(&ProductId::new("SKU-001"))
            .await
            .unwrap(),
        0
    );
}
