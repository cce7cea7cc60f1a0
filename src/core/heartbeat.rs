//! # Heartbeat-driven failure detection.
//!
//! [`HeartbeatMonitor`] tracks clusters that have signalled readiness and
//! polls them on a fixed interval. Each cycle sends a heartbeat probe to every
//! tracked cluster and checks whether an acknowledgment arrived since the
//! previous cycle; consecutive silent cycles accumulate as misses.
//!
//! ```text
//! every interval:
//!   for each tracked cluster:
//!     acked since last cycle? ── yes ──► misses = 0
//!            │ no
//!            ▼
//!     misses += 1 ── < threshold ──► keep waiting
//!            │ >= threshold
//!            ▼
//!     untrack + HeartbeatMissed + RespawnScheduled + forced respawn
//! ```
//!
//! ## Rules
//! - A cluster enters tracking when it signals ready, and leaves on kill,
//!   death, or the miss threshold — so the forced respawn fires exactly once
//!   per detected failure.
//! - Respawns run as detached tasks; a slow spawn never stalls the poll loop.
//! - A forced respawn that fails (or produces a worker that is not yet ready)
//!   is reported as a `WorkerError` event and tracking re-arms, so the next
//!   threshold crossing retries; a hung replacement cannot escape detection.
//! - `max_missed = 0` disables the monitor (the loop is never started).

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::manager::ClusterManager;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::IpcMessage;
use crate::shard::ClusterId;

struct BeatState {
    /// Ack seen since the previous poll cycle.
    acked: bool,
    /// Consecutive cycles without an ack.
    misses: u32,
}

/// Liveness tracker for ready clusters.
pub struct HeartbeatMonitor {
    entries: RwLock<HashMap<ClusterId, BeatState>>,
    interval: Duration,
    max_missed: u32,
    bus: Bus,
}

impl HeartbeatMonitor {
    pub(crate) fn new(interval: Duration, max_missed: u32, bus: Bus) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            interval,
            max_missed,
            bus,
        }
    }

    /// Number of clusters currently under liveness tracking.
    pub async fn tracked(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Starts (or restarts) tracking a cluster, with a clean miss count.
    pub(crate) async fn track(&self, id: ClusterId) {
        self.entries.write().await.insert(
            id,
            BeatState {
                acked: true,
                misses: 0,
            },
        );
    }

    /// Records a heartbeat acknowledgment. Unknown ids are ignored.
    pub(crate) async fn ack(&self, id: ClusterId) {
        if let Some(state) = self.entries.write().await.get_mut(&id) {
            state.acked = true;
            state.misses = 0;
        }
    }

    /// Stops tracking a cluster. `expected` marks deliberate removal (kill);
    /// an unexpected one (death mid-tracking) leaves a debug breadcrumb.
    pub(crate) async fn remove_cluster(&self, id: ClusterId, expected: bool) {
        let was_tracked = self.entries.write().await.remove(&id).is_some();
        if was_tracked && !expected {
            self.bus.publish(
                Event::now(EventKind::Debug)
                    .with_cluster(id)
                    .with_reason("cluster died while under heartbeat tracking"),
            );
        }
    }

    /// Spawns the poll loop. Runs until the token is cancelled or the manager
    /// is dropped.
    pub(crate) fn spawn_loop(
        self: Arc<Self>,
        manager: Weak<ClusterManager>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so clusters get a full
            // interval before their first liveness check.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let Some(manager) = manager.upgrade() else { return };
                Arc::clone(&self).poll_once(&manager).await;
            }
        })
    }

    /// One poll cycle: score misses, fire forced respawns, send fresh probes.
    async fn poll_once(self: Arc<Self>, manager: &Arc<ClusterManager>) {
        let mut failed = Vec::new();
        let mut alive = Vec::new();
        {
            let mut entries = self.entries.write().await;
            entries.retain(|id, state| {
                if state.acked {
                    state.acked = false;
                    state.misses = 0;
                } else {
                    state.misses += 1;
                    if state.misses >= self.max_missed {
                        failed.push(*id);
                        return false;
                    }
                }
                alive.push(*id);
                true
            });
        }

        for id in failed {
            self.bus.publish(
                Event::now(EventKind::HeartbeatMissed)
                    .with_cluster(id)
                    .with_reason(format!("missed {} heartbeats", self.max_missed)),
            );
            let Some(cluster) = manager.cluster(id).await else {
                continue;
            };
            self.bus.publish(
                Event::now(EventKind::RespawnScheduled)
                    .with_cluster(id)
                    .with_delay(manager.config().spawn_delay),
            );
            let monitor = Arc::clone(&self);
            tokio::spawn(async move {
                match cluster.respawn(None, None).await {
                    Ok(()) if cluster.is_ready() => {}
                    Ok(()) => {
                        // No readiness gate was configured; keep watching the
                        // replacement until it acks or misses out again.
                        monitor.track(cluster.id()).await;
                    }
                    Err(err) => {
                        monitor.bus.publish(
                            Event::now(EventKind::WorkerError)
                                .with_cluster(cluster.id())
                                .with_reason(format!("forced respawn failed: {err}")),
                        );
                        monitor.track(cluster.id()).await;
                    }
                }
            });
        }

        for id in alive {
            let Some(cluster) = manager.cluster(id).await else {
                continue;
            };
            if let Ok(handle) = cluster.thread_handle().await {
                let _ = handle.send(IpcMessage::Heartbeat.into()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(max_missed: u32) -> HeartbeatMonitor {
        HeartbeatMonitor::new(Duration::from_secs(5), max_missed, Bus::new(16))
    }

    #[tokio::test]
    async fn test_track_and_remove() {
        let m = monitor(3);
        m.track(7).await;
        assert_eq!(m.tracked().await, 1);
        m.remove_cluster(7, true).await;
        assert_eq!(m.tracked().await, 0);
    }

    #[tokio::test]
    async fn test_ack_resets_misses() {
        let m = monitor(3);
        m.track(1).await;
        {
            let mut entries = m.entries.write().await;
            let state = entries.get_mut(&1).unwrap();
            state.acked = false;
            state.misses = 2;
        }
        m.ack(1).await;
        let entries = m.entries.read().await;
        let state = entries.get(&1).unwrap();
        assert!(state.acked);
        assert_eq!(state.misses, 0);
    }

    #[tokio::test]
    async fn test_ack_unknown_cluster_is_noop() {
        let m = monitor(3);
        m.ack(42).await;
        assert_eq!(m.tracked().await, 0);
    }
}
