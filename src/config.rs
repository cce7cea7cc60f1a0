//! # Global fleet configuration.
//!
//! Provides [`ManagerConfig`] — centralized settings for the cluster manager
//! runtime: fleet topology, spawn queue behavior, heartbeat policy, and event
//! bus capacity.
//!
//! ## Sentinel values
//! - `spawn_timeout = 0s` → spawn resolves immediately, no readiness gate
//! - `max_missed_heartbeats = 0` → heartbeat monitor disabled
//! - `request_timeout = 0s` → pending requests have no default expiry

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the manager paces cluster spawns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Spawn all clusters immediately and concurrently.
    Auto,
    /// Gate each spawn behind completion of the previous one plus
    /// [`ManagerConfig::spawn_delay`], avoiding a thundering herd of
    /// simultaneous worker startups.
    Manual,
}

/// What kind of isolated execution unit the thread factory produces.
///
/// Forwarded to workers inside [`WorkerContext`](crate::thread::WorkerContext);
/// the manager itself treats both identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerMode {
    /// Workers are separate OS processes.
    Process,
    /// Workers are in-process worker threads.
    Worker,
}

/// Global configuration for the cluster manager runtime.
///
/// Defines:
/// - **Topology**: total shard and cluster counts
/// - **Spawn policy**: queue mode, inter-spawn delay, readiness timeout
/// - **Failure detection**: heartbeat interval and miss threshold
/// - **Event system**: bus capacity for controller-level event delivery
///
/// ## Field semantics
/// - `spawn_delay`: pause between queued spawns and before a respawn (800ms
///   default, matching the classic respawn backoff)
/// - `spawn_timeout`: readiness gate per spawn (`0s` = resolve immediately)
/// - `heartbeat_interval`: monitor poll period
/// - `max_missed_heartbeats`: polls without an ack before a forced respawn
///   (`0` = monitor disabled)
/// - `request_timeout`: default expiry for request/evaluate correlation
///   entries (`0s` = none; callers may override per call)
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Total number of workload shards split across the fleet.
    pub total_shards: u32,

    /// Total number of clusters (worker processes) in the fleet.
    pub total_clusters: u32,

    /// Spawn pacing mode. See [`QueueMode`].
    pub queue_mode: QueueMode,

    /// Execution-unit flavor forwarded to workers. See [`ManagerMode`].
    pub mode: ManagerMode,

    /// Delay between queued spawns and the default respawn delay.
    pub spawn_delay: Duration,

    /// Maximum time to wait for a freshly spawned worker to signal readiness.
    ///
    /// `Duration::ZERO` disables the readiness race: `spawn` resolves
    /// immediately after the thread starts.
    pub spawn_timeout: Duration,

    /// Period between heartbeat monitor poll cycles.
    pub heartbeat_interval: Duration,

    /// Number of consecutive poll cycles without an acknowledgment before the
    /// cluster is forcibly respawned. `0` disables the monitor entirely.
    pub max_missed_heartbeats: u32,

    /// Default timeout for request/evaluate correlation entries.
    ///
    /// `Duration::ZERO` = no default expiry. Per-call timeouts override this.
    pub request_timeout: Duration,

    /// Capacity of the event bus broadcast ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` events will
    /// observe `Lagged` and skip older items. Minimum value is 1 (enforced by
    /// the bus).
    pub bus_capacity: usize,

    /// Caller-supplied extra data merged into every worker's startup context.
    pub cluster_data: Map<String, Value>,
}

impl ManagerConfig {
    /// Returns the spawn readiness timeout as an `Option`.
    ///
    /// - `None` → no readiness gate
    /// - `Some(d)` → spawn races readiness against `d`
    #[inline]
    pub fn spawn_timeout_opt(&self) -> Option<Duration> {
        if self.spawn_timeout == Duration::ZERO {
            None
        } else {
            Some(self.spawn_timeout)
        }
    }

    /// Returns the default request timeout as an `Option`.
    #[inline]
    pub fn request_timeout_opt(&self) -> Option<Duration> {
        if self.request_timeout == Duration::ZERO {
            None
        } else {
            Some(self.request_timeout)
        }
    }

    /// Returns whether heartbeat-based failure detection is enabled.
    #[inline]
    pub fn heartbeat_enabled(&self) -> bool {
        self.max_missed_heartbeats > 0
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ManagerConfig {
    /// Default configuration:
    ///
    /// - `total_shards = 1`, `total_clusters = 1` (single-worker fleet)
    /// - `queue_mode = Auto`, `mode = Process`
    /// - `spawn_delay = 800ms`, `spawn_timeout = 30s`
    /// - `heartbeat_interval = 5s`, `max_missed_heartbeats = 3`
    /// - `request_timeout = 0s` (no default expiry)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            total_shards: 1,
            total_clusters: 1,
            queue_mode: QueueMode::Auto,
            mode: ManagerMode::Process,
            spawn_delay: Duration::from_millis(800),
            spawn_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(5),
            max_missed_heartbeats: 3,
            request_timeout: Duration::ZERO,
            bus_capacity: 1024,
            cluster_data: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_accessors() {
        let mut cfg = ManagerConfig::default();
        assert_eq!(cfg.spawn_timeout_opt(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.request_timeout_opt(), None);
        assert!(cfg.heartbeat_enabled());

        cfg.spawn_timeout = Duration::ZERO;
        cfg.max_missed_heartbeats = 0;
        cfg.request_timeout = Duration::from_secs(5);
        assert_eq!(cfg.spawn_timeout_opt(), None);
        assert!(!cfg.heartbeat_enabled());
        assert_eq!(cfg.request_timeout_opt(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_bus_capacity_clamped() {
        let cfg = ManagerConfig {
            bus_capacity: 0,
            ..ManagerConfig::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
