//! # Fleet coordinator.
//!
//! [`ClusterManager`] owns every [`Cluster`], the shared event bus, the
//! correlation and broker registries, and the heartbeat monitor. It is built
//! once through [`ClusterManagerBuilder`](crate::ClusterManagerBuilder) and
//! then shared behind `Arc`.
//!
//! ```text
//!                    ┌──────────────────┐
//!   spawn_clusters ─►│  ClusterManager  │─► Bus ─► subscribers
//!   broadcast       │                  │
//!   evaluate_on_all │  clusters: 0..N  │◄─ HeartbeatMonitor (forced respawn)
//!   broker_send     │  correlation     │
//!   shutdown        │  broker registry │
//!                    └──────────────────┘
//! ```
//!
//! ## Rules
//! - Cluster ids are dense `0..total_clusters`; shard chunks are assigned
//!   contiguously and never change for the life of the manager.
//! - Fleet-wide calls (`evaluate_on_all`, `invoke_on_all`, `fetch`) isolate
//!   per-cluster failures: one dead worker yields its own error entry and
//!   never poisons the rest of the batch.
//! - `broadcast` targets ready clusters only and is best-effort per cluster.
//! - `shutdown` is terminal: the token is cancelled, background loops stop,
//!   and every worker is killed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::ManagerConfig;
use crate::core::cluster::Cluster;
use crate::core::heartbeat::HeartbeatMonitor;
use crate::core::shutdown;
use crate::error::ClusterError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{BrokerFrame, BrokerRegistry, CorrelationRegistry, Subscription, WireMessage};
use crate::shard::{self, ClusterId};
use crate::thread::ThreadFactory;

/// Central coordinator for a fleet of worker clusters.
pub struct ClusterManager {
    cfg: ManagerConfig,
    bus: Bus,
    clusters: RwLock<BTreeMap<ClusterId, Arc<Cluster>>>,
    pub(crate) correlation: Arc<CorrelationRegistry>,
    pub(crate) broker: Arc<BrokerRegistry>,
    pub(crate) heartbeat: Arc<HeartbeatMonitor>,
    pub(crate) factory: Arc<dyn ThreadFactory>,
    pub(crate) token: CancellationToken,
}

impl ClusterManager {
    pub(crate) fn new(
        cfg: ManagerConfig,
        bus: Bus,
        heartbeat: Arc<HeartbeatMonitor>,
        factory: Arc<dyn ThreadFactory>,
        token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            clusters: RwLock::new(BTreeMap::new()),
            correlation: Arc::new(CorrelationRegistry::new()),
            broker: Arc::new(BrokerRegistry::new()),
            heartbeat,
            factory,
            token,
        }
    }

    /// Starts a [`ClusterManagerBuilder`](crate::ClusterManagerBuilder) with
    /// the given configuration and thread backend.
    pub fn builder(
        cfg: ManagerConfig,
        factory: Arc<dyn ThreadFactory>,
    ) -> super::builder::ClusterManagerBuilder {
        super::builder::ClusterManagerBuilder::new(cfg, factory)
    }

    /// The active configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.cfg
    }

    /// The shared event bus, for external subscriptions.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Looks up one cluster by id.
    pub async fn cluster(&self, id: ClusterId) -> Option<Arc<Cluster>> {
        self.clusters.read().await.get(&id).cloned()
    }

    /// Snapshot of all clusters in id order.
    pub async fn clusters(&self) -> Vec<Arc<Cluster>> {
        self.clusters.read().await.values().cloned().collect()
    }

    /// Creates (if needed) and spawns every cluster per the configured
    /// topology and queue mode.
    ///
    /// - [`QueueMode::Auto`](crate::config::QueueMode::Auto): all spawns run
    ///   concurrently; the first failure is reported after every spawn has
    ///   settled.
    /// - [`QueueMode::Manual`](crate::config::QueueMode::Manual): spawns run
    ///   one at a time with `spawn_delay` between them, stopping at the first
    ///   failure.
    pub async fn spawn_clusters(self: &Arc<Self>) -> Result<(), ClusterError> {
        let fleet = self.ensure_clusters().await?;
        let timeout = self.cfg.spawn_timeout_opt();

        match self.cfg.queue_mode {
            crate::config::QueueMode::Auto => {
                let spawns = fleet.iter().map(|c| c.spawn(timeout));
                let results = join_all(spawns).await;
                for result in results {
                    result?;
                }
            }
            crate::config::QueueMode::Manual => {
                let mut first = true;
                for cluster in &fleet {
                    if !first && self.cfg.spawn_delay > Duration::ZERO {
                        tokio::time::sleep(self.cfg.spawn_delay).await;
                    }
                    first = false;
                    cluster.spawn(timeout).await?;
                }
            }
        }
        Ok(())
    }

    /// Sends a data message to every ready cluster except those in `exclude`.
    /// Returns how many clusters the message was delivered to; per-cluster
    /// send failures are skipped.
    pub async fn broadcast(
        &self,
        message: Value,
        exclude: &[ClusterId],
    ) -> Result<usize, ClusterError> {
        let mut delivered = 0;
        for cluster in self.clusters().await {
            if exclude.contains(&cluster.id()) || !cluster.is_ready() {
                continue;
            }
            if cluster.send(message.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Legacy: evaluates source text on every cluster concurrently.
    ///
    /// Each cluster reports independently; the result vector is in id order.
    pub async fn evaluate_on_all(
        &self,
        source: impl Into<String>,
        context: Option<Value>,
        timeout: Option<Duration>,
    ) -> Vec<(ClusterId, Result<Value, ClusterError>)> {
        let source = source.into();
        let fleet = self.clusters().await;
        let calls = fleet.iter().map(|c| {
            let source = source.clone();
            let context = context.clone();
            async move { (c.id(), c.evaluate(source, context, timeout).await) }
        });
        join_all(calls).await
    }

    /// Calls a named remote operation on every cluster concurrently.
    pub async fn invoke_on_all(
        &self,
        op: impl Into<String>,
        args: Value,
        timeout: Option<Duration>,
    ) -> Vec<(ClusterId, Result<Value, ClusterError>)> {
        let op = op.into();
        let fleet = self.clusters().await;
        let calls = fleet.iter().map(|c| {
            let op = op.clone();
            let args = args.clone();
            async move { (c.id(), c.invoke(op, args, timeout).await) }
        });
        join_all(calls).await
    }

    /// Legacy: fetches one hosted-application property from every cluster.
    pub async fn fetch(
        &self,
        prop: &str,
        timeout: Option<Duration>,
    ) -> Vec<(ClusterId, Result<Value, ClusterError>)> {
        let source = format!("this.{prop}");
        let fleet = self.clusters().await;
        let calls = fleet.iter().map(|c| {
            let source = source.clone();
            async move { (c.id(), c.evaluate_on_host(source, None, timeout).await) }
        });
        join_all(calls).await
    }

    /// Publishes a broker frame to one cluster (`target = Some`) or to every
    /// spawned cluster (`target = None`, best-effort).
    pub async fn broker_send(
        &self,
        channel: impl Into<String>,
        payload: Value,
        target: Option<ClusterId>,
    ) -> Result<(), ClusterError> {
        let frame = WireMessage::Broker(BrokerFrame {
            broker: channel.into(),
            data: payload,
        });

        match target {
            Some(id) => {
                let cluster = self
                    .cluster(id)
                    .await
                    .ok_or(ClusterError::InvalidClusterId { id })?;
                let handle = cluster.thread_handle().await?;
                handle.send(frame).await
            }
            None => {
                for cluster in self.clusters().await {
                    if let Ok(handle) = cluster.thread_handle().await {
                        let _ = handle.send(frame.clone()).await;
                    }
                }
                Ok(())
            }
        }
    }

    /// Registers a controller-side broker listener.
    pub async fn broker_listen(
        &self,
        channel: impl Into<String>,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.broker.listen(channel, handler).await
    }

    /// Removes exactly the listener behind `sub`.
    pub async fn broker_unlisten(&self, sub: Subscription) {
        self.broker.unlisten(&sub).await;
    }

    /// Respawns the whole fleet sequentially, oldest id first.
    pub async fn respawn_all(
        &self,
        delay: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<(), ClusterError> {
        for cluster in self.clusters().await {
            cluster.respawn(delay, timeout).await?;
        }
        Ok(())
    }

    /// Kills every cluster. Idempotent.
    pub async fn kill_all(&self, reason: Option<&str>) {
        for cluster in self.clusters().await {
            cluster.kill(reason).await;
        }
    }

    /// Terminal shutdown: announces it, stops background loops, and kills the
    /// fleet.
    pub async fn shutdown(&self) {
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        self.token.cancel();
        self.kill_all(Some("shutdown")).await;
    }

    /// Blocks until a termination signal (or an explicit [`shutdown`] from
    /// elsewhere), then tears the fleet down.
    ///
    /// [`shutdown`]: ClusterManager::shutdown
    pub async fn run_until_shutdown(&self) -> Result<(), ClusterError> {
        tokio::select! {
            res = shutdown::wait_for_signal() => {
                res?;
                self.shutdown().await;
            }
            _ = self.token.cancelled() => {
                self.kill_all(Some("shutdown")).await;
            }
        }
        Ok(())
    }

    /// Builds the cluster map from the configured topology on first call;
    /// later calls reuse the existing clusters.
    async fn ensure_clusters(self: &Arc<Self>) -> Result<Vec<Arc<Cluster>>, ClusterError> {
        let chunks = shard::distribute(self.cfg.total_shards, self.cfg.total_clusters)?;

        let mut clusters = self.clusters.write().await;
        for (id, shard_list) in chunks.into_iter().enumerate() {
            let id = id as ClusterId;
            clusters.entry(id).or_insert_with(|| {
                Arc::new(Cluster::new(
                    id,
                    shard_list,
                    self.cfg.clone(),
                    self.bus.clone(),
                    Arc::clone(&self.correlation),
                    Arc::clone(&self.broker),
                    Arc::clone(&self.heartbeat),
                    Arc::clone(&self.factory),
                    Arc::downgrade(self),
                ))
            });
        }
        Ok(clusters.values().cloned().collect())
    }
}
