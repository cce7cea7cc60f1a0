//! # Builder wiring for the cluster manager runtime.
//!
//! [`ClusterManagerBuilder`] assembles the shared pieces (event bus,
//! subscriber fan-out, heartbeat monitor, cancellation token), starts the
//! background loops, and hands back the manager behind `Arc`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::heartbeat::HeartbeatMonitor;
use super::manager::ClusterManager;
use crate::config::ManagerConfig;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::thread::ThreadFactory;

/// Builder for constructing a [`ClusterManager`] with optional features.
pub struct ClusterManagerBuilder {
    cfg: ManagerConfig,
    factory: Arc<dyn ThreadFactory>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ClusterManagerBuilder {
    /// Creates a new builder with the given configuration and thread backend.
    pub fn new(cfg: ManagerConfig, factory: Arc<dyn ThreadFactory>) -> Self {
        Self {
            cfg,
            factory,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive controller events (cluster lifecycle, traffic,
    /// heartbeat policy) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds and returns the manager instance.
    ///
    /// This consumes the builder and initializes all runtime components:
    /// - Event bus for broadcasting
    /// - Subscriber workers plus the bus-to-subscribers forwarding loop
    /// - Heartbeat monitor loop (only when `max_missed_heartbeats > 0`)
    ///
    /// Clusters are created lazily by
    /// [`spawn_clusters`](ClusterManager::spawn_clusters).
    pub fn build(self) -> Arc<ClusterManager> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let token = CancellationToken::new();

        let heartbeat = Arc::new(HeartbeatMonitor::new(
            self.cfg.heartbeat_interval,
            self.cfg.max_missed_heartbeats,
            bus.clone(),
        ));
        let heartbeat_enabled = self.cfg.heartbeat_enabled();

        let manager = Arc::new(ClusterManager::new(
            self.cfg,
            bus.clone(),
            Arc::clone(&heartbeat),
            self.factory,
            token.clone(),
        ));

        spawn_listener(&bus, subs, token.clone());
        if heartbeat_enabled {
            heartbeat.spawn_loop(Arc::downgrade(&manager), token);
        }
        manager
    }
}

/// Forwards bus events into the subscriber set until cancellation. Lagged
/// receivers skip the overwritten events and keep going.
fn spawn_listener(bus: &Bus, subs: SubscriberSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    subs.shutdown().await;
                    return;
                }
                res = rx.recv() => match res {
                    Ok(ev) => subs.emit_arc(Arc::new(ev)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    });
}
