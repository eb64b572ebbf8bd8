//! Shared types for the checkout core.

pub mod clock;
pub mod money;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock, deadline};
pub use money::Money;
pub use types::{OrderId, ProductId, ReservationId};
