//! # Shared event channel of the controller.
//!
//! Every part of the fleet that has something to report — cluster lifecycle
//! code, the per-cluster routers, the heartbeat monitor, the manager — pushes
//! its [`Event`]s through one [`Bus`], a [`tokio::sync::broadcast`] channel.
//! Publishing never waits on consumers: the routers run on the message hot
//! path and must not stall behind a slow observer.
//!
//! ## Rules
//! - Capacity is one shared ring buffer, sized once at construction. A
//!   receiver that falls more than `capacity` events behind observes
//!   `RecvError::Lagged(n)` and resumes at the oldest retained event.
//! - Nothing is stored for later: an event published while no receiver
//!   exists is gone.
//! - Receivers only see events published after their `subscribe` call.

use tokio::sync::broadcast;

use super::event::Event;

/// Handle on the controller's event channel.
///
/// Clones share the underlying sender, so every component holds its own
/// `Bus` by value and publishes concurrently.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates the channel. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Hands an event to every current receiver and returns immediately.
    /// With no receivers attached the event is simply discarded.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Opens an independent receiver for everything published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
