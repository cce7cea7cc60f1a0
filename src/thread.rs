//! # Abstract worker thread capability.
//!
//! The concrete mechanism for spawning an OS process or an in-process worker
//! and exchanging raw messages with it is an external collaborator. The
//! controller consumes it through two seams:
//!
//! - [`ThreadFactory`] — starts one worker from a [`WorkerContext`] and hands
//!   back a [`SpawnedThread`];
//! - [`Thread`] — the running handle: `send` and `kill`, with asynchronous
//!   `message`/`error`/`exit` delivery over the [`SpawnedThread::events`]
//!   channel.
//!
//! Messages from a single thread are delivered in send order; there is no
//! ordering guarantee across different threads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::config::{ManagerMode, QueueMode};
use crate::error::ClusterError;
use crate::protocol::WireMessage;
use crate::shard::{ClusterId, ShardId};

/// Typed, immutable startup configuration handed to a spawned worker.
///
/// Replaces ambient process-environment mutation: the worker receives this as
/// a structured startup argument merged with any caller-supplied extras.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerContext {
    /// Id of the cluster this worker serves.
    pub cluster_id: ClusterId,
    /// Ordered shard list assigned to this worker.
    pub shard_list: Vec<ShardId>,
    /// Total number of shards across the fleet.
    pub total_shards: u32,
    /// Total number of clusters in the fleet.
    pub total_clusters: u32,
    /// Spawn pacing mode of the owning manager.
    pub queue_mode: QueueMode,
    /// Execution-unit flavor of the owning manager.
    pub manager_mode: ManagerMode,
    /// Caller-supplied extra data merged in at spawn time.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Asynchronous notification from a running worker thread.
#[derive(Debug)]
pub enum ThreadEvent {
    /// A wire message arrived from the worker.
    Message(WireMessage),
    /// The worker reported a non-fatal error.
    Error(String),
    /// The worker exited with the given code. Terminal; no further events
    /// follow.
    Exit(i32),
}

/// A freshly spawned worker: the outbound handle plus the inbound event
/// stream. The receiver is consumed by the cluster's message router.
pub struct SpawnedThread {
    /// Outbound handle (send/kill), exclusively owned by its cluster.
    pub handle: std::sync::Arc<dyn Thread>,
    /// Inbound events, in per-thread send order.
    pub events: mpsc::UnboundedReceiver<ThreadEvent>,
}

/// Running handle to one isolated execution unit.
#[async_trait]
pub trait Thread: Send + Sync + 'static {
    /// Delivers one wire message to the worker.
    async fn send(&self, message: WireMessage) -> Result<(), ClusterError>;

    /// Terminates the worker. The backend emits [`ThreadEvent::Exit`] once the
    /// unit is gone; `kill` itself does not wait for that.
    fn kill(&self);
}

/// Backend that starts isolated execution units.
pub trait ThreadFactory: Send + Sync + 'static {
    /// Starts one worker with the given startup context.
    fn spawn(&self, ctx: WorkerContext) -> Result<SpawnedThread, ClusterError>;
}
