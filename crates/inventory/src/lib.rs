//! Inventory ledger and reservation store for checkout.
//!
//! The ledger owns per-product available quantities. The reservation store
//! places time-bounded holds against it and is the only component that
//! mutates those quantities during checkout. Overdue holds are returned to
//! stock by the [`ExpirySweeper`].

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod reservation;
pub mod store;
pub mod sweeper;

pub use error::{InventoryError, Result};
pub use ledger::{InventoryLedger, StockRecord};
pub use memory::{InMemoryInventoryLedger, InMemoryReservationStore};
pub use postgres::{PostgresInventoryLedger, PostgresReservationStore, run_migrations};
pub use reservation::{Reservation, ReservationState};
pub use store::ReservationStore;
pub use sweeper::{ExpirySweeper, SweeperHandle};
