//! # Controller events emitted by clusters, routers, and the monitor.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Lifecycle events**: spawn, readiness, death
//! - **Traffic events**: inbound worker messages and requests, worker errors
//! - **Policy events**: heartbeat misses, scheduled respawns, maintenance
//!
//! The [`Event`] struct carries optional metadata: cluster id, payload,
//! correlation nonce, reason text, exit code, and timing fields.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore order when events are delivered
//! out of order across subscriber queues.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::protocol::Nonce;
use crate::shard::ClusterId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of controller events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle events ===
    /// A cluster's thread was started.
    ///
    /// Sets: `cluster`, `at`, `seq`.
    ClusterSpawned,

    /// A cluster signalled readiness for the first time since spawn.
    ///
    /// Sets: `cluster`, `at`, `seq`.
    ClusterReady,

    /// A cluster's thread is gone, whether it exited on its own or was
    /// deliberately killed.
    ///
    /// Sets: `cluster`, `at`, `seq`; `exit_code` on a worker-side exit,
    /// `reason` on a deliberate kill.
    ClusterDeath,

    // === Traffic events ===
    /// A plain data message arrived from a worker.
    ///
    /// Sets: `cluster`, `payload`, `at`, `seq`.
    MessageReceived,

    /// A request-tagged message arrived from a worker; answer it with
    /// [`Cluster::reply_to`](crate::Cluster::reply_to) using `nonce`.
    ///
    /// Sets: `cluster`, `payload`, `nonce`, `at`, `seq`.
    ClientRequest,

    /// A worker reported an error. Never thrown inline; the controller relies
    /// on heartbeat/respawn for recovery if the error was fatal to the worker.
    ///
    /// Sets: `cluster`, `reason`, `at`, `seq`.
    WorkerError,

    // === Policy events ===
    /// A tracked cluster crossed the missed-heartbeat threshold.
    ///
    /// Sets: `cluster`, `reason` (miss count), `at`, `seq`.
    HeartbeatMissed,

    /// A forced respawn was scheduled for a cluster.
    ///
    /// Sets: `cluster`, `delay_ms`, `at`, `seq`.
    RespawnScheduled,

    /// Maintenance mode was toggled on a cluster.
    ///
    /// Sets: `cluster`, `reason` (enable reason, absent on disable), `at`, `seq`.
    MaintenanceToggled,

    // === Subscriber/runtime events ===
    /// A subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason`, `at`, `seq`.
    SubscriberOverflow,

    /// A subscriber panicked during event processing.
    ///
    /// Sets: `reason`, `at`, `seq`.
    SubscriberPanicked,

    /// Fleet shutdown was requested (signal or explicit call).
    ///
    /// Sets: `at`, `seq`.
    ShutdownRequested,

    /// Free-form diagnostic breadcrumb.
    ///
    /// Sets: `cluster` (optional), `reason`, `at`, `seq`.
    Debug,
}

/// Controller event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Cluster the event concerns, if any.
    pub cluster: Option<ClusterId>,
    /// Inbound message payload (traffic events).
    pub payload: Option<Value>,
    /// Correlation nonce of a worker-originated request.
    pub nonce: Option<Nonce>,
    /// Human-readable reason (errors, kill reasons, diagnostics).
    pub reason: Option<Arc<str>>,
    /// Worker exit code (death events).
    pub exit_code: Option<i32>,
    /// Scheduled delay in milliseconds (respawn events).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            cluster: None,
            payload: None,
            nonce: None,
            reason: None,
            exit_code: None,
            delay_ms: None,
        }
    }

    /// Attaches the concerned cluster id.
    #[inline]
    pub fn with_cluster(mut self, id: ClusterId) -> Self {
        self.cluster = Some(id);
        self
    }

    /// Attaches a message payload.
    #[inline]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attaches a correlation nonce.
    #[inline]
    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a worker exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches a scheduled delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::now(EventKind::Debug);
        let b = Event::now(EventKind::Debug);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builder_setters() {
        let ev = Event::now(EventKind::RespawnScheduled)
            .with_cluster(2)
            .with_delay(Duration::from_millis(800))
            .with_reason("missed 3 heartbeats");
        assert_eq!(ev.cluster, Some(2));
        assert_eq!(ev.delay_ms, Some(800));
        assert_eq!(ev.reason.as_deref(), Some("missed 3 heartbeats"));
    }
}
