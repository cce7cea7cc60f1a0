//! # Observer hook for fleet events.
//!
//! Embedders watch the fleet by implementing [`Subscribe`] and handing the
//! implementation to the
//! [`ClusterManagerBuilder`](crate::ClusterManagerBuilder). The
//! [`SubscriberSet`](crate::subscribers::SubscriberSet) gives each
//! implementation its own bounded queue and worker task, so a handler that
//! writes to disk or a network sink slows down nobody but itself — at worst
//! its own queue fills and events addressed to it are dropped.
//!
//! A typical implementation watches a few [`EventKind`](crate::EventKind)s
//! (deaths, missed heartbeats, client requests) and ignores the rest:
//!
//! ```rust
//! // use clustervisor::{Event, EventKind, Subscribe};
//! //
//! // struct DeathAlerts;
//! // #[async_trait::async_trait]
//! // impl Subscribe for DeathAlerts {
//! //     async fn on_event(&self, ev: &Event) {
//! //         if ev.kind == EventKind::ClusterDeath {
//! //             // page someone...
//! //         }
//! //     }
//! //     fn name(&self) -> &'static str { "death-alerts" }
//! // }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// One observer of the controller's event stream.
///
/// `on_event` runs on the observer's private worker task; it may await freely
/// but should not block the thread.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Events arrive in publish order for this observer.
    async fn on_event(&self, event: &Event);

    /// Name used when reporting overflow or panics for this observer.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// How many events may sit unprocessed before new ones are dropped
    /// for this observer.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
