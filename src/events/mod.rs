//! Controller-level event system.
//!
//! - [`bus`]: broadcast channel carrying [`Event`]s from clusters, the router,
//!   and the heartbeat monitor to the manager's subscriber listener;
//! - [`event`]: the [`Event`] struct and [`EventKind`] classification.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
