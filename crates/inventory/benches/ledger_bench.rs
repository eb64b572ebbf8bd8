use std::time::Duration;

use common::{ProductId, SystemClock};
use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{InMemoryInventoryLedger, InMemoryReservationStore, InventoryLedger, ReservationStore};

const TTL: Duration = Duration::from_secs(300);

fn bench_reserve_and_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryInventoryLedger::with_stock([("SKU-001", u64::MAX / 2)]);
    let store = InMemoryReservationStore::new(ledger, SystemClock);
    let product = ProductId::new("SKU-001");

    c.bench_function("reservations/reserve_and_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reservation = store.reserve(&product, 1, TTL).await.unwrap();
                store.commit(reservation.reservation_id).await.unwrap();
            });
        });
    });
}

fn bench_reserve_and_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryInventoryLedger::with_stock([("SKU-001", 1_000)]);
    let store = InMemoryReservationStore::new(ledger, SystemClock);
    let product = ProductId::new("SKU-001");

    c.bench_function("reservations/reserve_and_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reservation = store.reserve(&product, 5, TTL).await.unwrap();
                store.release(reservation.reservation_id).await.unwrap();
            });
        });
    });
}

fn bench_contended_decrement(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    c.bench_function("ledger/contended_decrement_64", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryInventoryLedger::with_stock([("SKU-001", 32)]);
                let tasks: Vec<_> = (0..64)
                    .map(|_| {
                        let ledger = ledger.clone();
                        tokio::spawn(async move {
                            ledger.try_decrement(&ProductId::new("SKU-001"), 1).await.is_ok()
                        })
                    })
                    .collect();

                let mut won = 0;
                for task in tasks {
                    if task.await.unwrap() {
                        won += 1;
                    }
                }
                assert_eq!(won, 32);
            });
        });
    });
}

fn bench_expire_due(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("reservations/expire_due_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryInventoryLedger::with_stock([("SKU-001", 100)]);
                let store = InMemoryReservationStore::new(ledger, SystemClock);
                let product = ProductId::new("SKU-001");
                for _ in 0..100 {
                    store.reserve(&product, 1, Duration::ZERO).await.unwrap();
                }
                let expired = store.expire_due(chrono::Utc::now()).await.unwrap();
                assert_eq!(expired.len(), 100);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_and_commit,
    bench_reserve_and_release,
    bench_contended_decrement,
    bench_expire_due
);
criterion_main!(benches);
