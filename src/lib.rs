//! # clustervisor
//!
//! **Clustervisor** is a sharded fleet-management library for Rust.
//!
//! It supervises a fleet of worker clusters (processes or in-process
//! workers), assigns each one a contiguous slice of workload shards, and
//! speaks a small IPC protocol with them: fire-and-forget data, correlated
//! request/reply, named pub/sub broker channels, and heartbeats that drive
//! automatic respawn of silent workers. The crate is designed as a building
//! block for higher-level orchestrators; the actual process/worker transport
//! is plugged in through the [`ThreadFactory`] seam.
//!
//! ## Architecture
//! ### Overview
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  ClusterManager (fleet coordinator)                            │
//! │  - Bus (broadcast events)                                      │
//! │  - CorrelationRegistry (nonce → pending reply)                 │
//! │  - BrokerRegistry (named pub/sub channels)                     │
//! │  - HeartbeatMonitor (liveness polling, forced respawn)         │
//! │  - SubscriberSet (fans out to user subscribers)                │
//! └──────┬──────────────────┬──────────────────┬───────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ Cluster 0 │      │ Cluster 1 │      │ Cluster N │
//!   │ shards    │      │ shards    │      │ shards    │
//!   │ [0..k)    │      │ [k..2k)   │      │ ...       │
//!   └─┬───▲────┘       └─┬───▲────┘       └─┬───▲────┘
//!     │   │ ThreadEvent   │   │              │   │
//!     ▼   │ (msg/err/exit)▼   │              ▼   │
//!   router task         router task        router task
//!     │                   │                  │
//!     │ classifies: ready / heartbeat / reply / data / request /
//!     │             broker frame / death
//!     ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                    │
//! └───────────────────────────────┬────────────────────────────────┘
//!                                 ▼
//!                           SubscriberSet
//!                          (per-sub queues)
//!                        ┌────────┼────────┐
//!                        ▼        ▼        ▼
//!                     worker1  worker2  workerN
//!                        ▼        ▼        ▼
//!                    sub1.on_  sub2.on_  subN.on_
//!                     event()   event()   event()
//! ```
//!
//! ### Cluster lifecycle
//! ```text
//! spawn(timeout)
//!   ├─► factory.spawn(WorkerContext) ─► thread + router task
//!   ├─► publish ClusterSpawned
//!   └─► race { ready msg ─► Ok
//!            , death     ─► Err(ReadyDied)
//!            , timeout   ─► Err(ReadyTimeout) }
//!
//! ready ─► heartbeat tracking starts
//!   every interval: probe; consecutive silent cycles count as misses
//!   misses >= threshold ─► HeartbeatMissed + RespawnScheduled
//!                          + forced respawn (exactly once per failure)
//!
//! death (exit or channel close)
//!   ─► seat cleared, pending requests rejected with WorkerDied,
//!      heartbeat tracking stopped, ClusterDeath published
//! ```
//!
//! ## Features
//! | Area               | Description                                                        | Key types / traits                          |
//! |--------------------|--------------------------------------------------------------------|---------------------------------------------|
//! | **Fleet control**  | Spawn, kill, respawn, and broadcast across the whole fleet.        | [`ClusterManager`], [`Cluster`]             |
//! | **IPC protocol**   | Typed wire messages with nonce-correlated request/reply.           | [`IpcMessage`], [`WireMessage`], [`Nonce`]  |
//! | **Broker**         | Named pub/sub channels riding the same transport.                  | [`BrokerRegistry`], [`WorkerBroker`]        |
//! | **Remote calls**   | Statically named operations (plus legacy source evaluation).       | [`RpcRegistry`]                             |
//! | **Failure policy** | Heartbeat-driven detection and automatic respawn.                  | [`HeartbeatMonitor`]                        |
//! | **Subscriber API** | Hook into controller events (logging, metrics, custom).            | [`Subscribe`], [`Event`]                    |
//! | **Sharding**       | Deterministic workload → shard → cluster routing.                  | [`shard_id_for_workload`], [`distribute`]   |
//! | **Errors**         | Typed errors for lifecycle, transport, and the wire boundary.      | [`ClusterError`], [`WireError`]             |
//! | **Configuration**  | Centralized runtime settings.                                      | [`ManagerConfig`]                           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use clustervisor::{ClusterManager, ManagerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = ManagerConfig {
//!         total_shards: 16,
//!         total_clusters: 4,
//!         spawn_timeout: Duration::from_secs(30),
//!         ..ManagerConfig::default()
//!     };
//!
//!     // `factory` is your transport backend implementing ThreadFactory
//!     // (e.g. one OS process per cluster).
//!     let manager = ClusterManager::builder(cfg, factory)
//!         .with_subscribers(vec![])
//!         .build();
//!
//!     manager.spawn_clusters().await?;
//!     manager.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod protocol;
mod shard;
mod subscribers;
mod thread;

// ---- Public re-exports ----

pub use config::{ManagerConfig, ManagerMode, QueueMode};
pub use crate::core::{Cluster, ClusterManager, ClusterManagerBuilder, HeartbeatMonitor};
pub use error::{ClusterError, WireError};
pub use events::{Bus, Event, EventKind};
pub use protocol::{
    BrokerFrame, BrokerRegistry, CorrelationRegistry, IpcMessage, Nonce, PendingReply,
    RpcHandler, RpcRegistry, Subscription, WireMessage, WorkerBroker,
};
pub use shard::{
    cluster_id_for_shard, cluster_id_for_workload, distribute, shard_id_for_workload, ClusterId,
    ShardId,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use thread::{SpawnedThread, Thread, ThreadEvent, ThreadFactory, WorkerContext};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
