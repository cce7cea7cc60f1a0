//! # Cluster: one worker's lifecycle state machine.
//!
//! A [`Cluster`] owns a single worker thread and its message router,
//! recreated together on every respawn — no state survives a respawn except
//! the id and shard assignment.
//!
//! ## State machine
//! ```text
//! unspawned ──spawn──► spawning ──ready msg──► ready
//!     ▲                   │                      │
//!     │                   │ kill / death         │ kill / death
//!     └───────────────────┴──────────────────────┘
//!
//! respawn = kill (if alive) → delay → spawn
//! ```
//!
//! ## Rules
//! - `spawn` races {ready, death, timeout}; the loser arms are dropped
//!   together once one fires.
//! - `send`/`request`/`evaluate`/`invoke` fail with `NoChildExists` before any
//!   I/O when no thread is attached.
//! - Death always triggers cleanup (thread/ready cleared, heartbeat tracking
//!   stopped, pending requests rejected, `ClusterDeath` emitted); respawning
//!   is a policy decision left to the heartbeat monitor or the caller.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::ManagerConfig;
use crate::core::manager::ClusterManager;
use crate::core::router;
use crate::core::heartbeat::HeartbeatMonitor;
use crate::error::ClusterError;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{BrokerRegistry, CorrelationRegistry, IpcMessage, Nonce};
use crate::shard::{ClusterId, ShardId};
use crate::thread::{Thread, ThreadFactory, WorkerContext};

/// Spawn-race outcome signalled by the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SpawnStatus {
    Pending,
    Ready,
    Dead,
}

/// Live thread attachment: handle, router task, and the spawn-race channel.
pub(crate) struct Seat {
    pub(crate) handle: Arc<dyn Thread>,
    router: JoinHandle<()>,
    status: watch::Sender<SpawnStatus>,
}

/// One managed worker: immutable identity plus a replaceable thread seat.
pub struct Cluster {
    id: ClusterId,
    shard_list: Arc<[ShardId]>,
    cfg: ManagerConfig,

    ready: AtomicBool,
    last_heartbeat: Mutex<Instant>,
    pub(crate) seat: RwLock<Option<Seat>>,

    pub(crate) bus: Bus,
    pub(crate) correlation: Arc<CorrelationRegistry>,
    pub(crate) broker: Arc<BrokerRegistry>,
    pub(crate) heartbeat: Arc<HeartbeatMonitor>,
    factory: Arc<dyn ThreadFactory>,
    manager: Weak<ClusterManager>,
}

impl Cluster {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ClusterId,
        shard_list: Vec<ShardId>,
        cfg: ManagerConfig,
        bus: Bus,
        correlation: Arc<CorrelationRegistry>,
        broker: Arc<BrokerRegistry>,
        heartbeat: Arc<HeartbeatMonitor>,
        factory: Arc<dyn ThreadFactory>,
        manager: Weak<ClusterManager>,
    ) -> Self {
        Self {
            id,
            shard_list: shard_list.into(),
            cfg,
            ready: AtomicBool::new(false),
            last_heartbeat: Mutex::new(Instant::now()),
            seat: RwLock::new(None),
            bus,
            correlation,
            broker,
            heartbeat,
            factory,
            manager,
        }
    }

    /// Id of this cluster.
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Ordered shard list assigned to this cluster.
    pub fn shard_list(&self) -> &[ShardId] {
        &self.shard_list
    }

    /// Total shard count across the fleet.
    pub fn total_shards(&self) -> u32 {
        self.cfg.total_shards
    }

    /// Total cluster count across the fleet.
    pub fn total_clusters(&self) -> u32 {
        self.cfg.total_clusters
    }

    /// Whether the worker has signalled readiness since its last spawn.
    pub fn is_ready(&self) -> bool {
        self.ready.load(AtomicOrdering::Acquire)
    }

    /// Whether a thread is currently attached.
    pub async fn is_spawned(&self) -> bool {
        self.seat.read().await.is_some()
    }

    /// Instant of the most recent heartbeat-related message from the worker.
    pub fn last_heartbeat(&self) -> Instant {
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the worker thread.
    ///
    /// Fails with [`ClusterError::AlreadySpawned`] if a thread exists. With
    /// `timeout == None` (or zero) the call resolves immediately after the
    /// thread starts; otherwise it races three outcomes: the worker's `ready`
    /// signal (ok), the worker dying first ([`ClusterError::ReadyDied`]), and
    /// the timeout elapsing ([`ClusterError::ReadyTimeout`]).
    pub async fn spawn(self: &Arc<Self>, timeout: Option<Duration>) -> Result<(), ClusterError> {
        let status_rx = {
            let mut seat = self.seat.write().await;
            if seat.is_some() {
                return Err(ClusterError::AlreadySpawned { id: self.id });
            }

            let spawned = self.factory.spawn(self.worker_context())?;
            let (status_tx, status_rx) = watch::channel(SpawnStatus::Pending);
            let router = tokio::spawn(router::run(
                Arc::clone(self),
                spawned.events,
                status_tx.clone(),
            ));
            *seat = Some(Seat {
                handle: spawned.handle,
                router,
                status: status_tx,
            });
            status_rx
        };

        self.bus
            .publish(Event::now(EventKind::ClusterSpawned).with_cluster(self.id));

        let Some(timeout) = timeout.filter(|t| *t > Duration::ZERO) else {
            return Ok(());
        };
        self.await_ready(status_rx, timeout).await
    }

    /// Waits for the spawn race to settle; dropping the receiver afterwards
    /// detaches every arm at once.
    async fn await_ready(
        &self,
        mut status_rx: watch::Receiver<SpawnStatus>,
        timeout: Duration,
    ) -> Result<(), ClusterError> {
        let outcome = time::timeout(
            timeout,
            status_rx.wait_for(|s| *s != SpawnStatus::Pending),
        )
        .await;

        match outcome {
            Err(_elapsed) => Err(ClusterError::ReadyTimeout {
                id: self.id,
                timeout,
            }),
            Ok(Err(_sender_gone)) => Err(ClusterError::ReadyDied { id: self.id }),
            Ok(Ok(status)) => match *status {
                SpawnStatus::Ready => Ok(()),
                _ => Err(ClusterError::ReadyDied { id: self.id }),
            },
        }
    }

    /// Terminates the worker and clears all per-spawn state.
    ///
    /// The death lifecycle event is part of the contract for deliberate kills
    /// too: since the router is detached before the backend's exit
    /// notification can arrive, `kill` publishes [`ClusterDeath`]
    /// (without an exit code) itself after cleanup. Idempotent: killing an
    /// already-dead cluster only re-clears the ready flag.
    ///
    /// [`ClusterDeath`]: EventKind::ClusterDeath
    pub async fn kill(&self, reason: Option<&str>) {
        self.ready.store(false, AtomicOrdering::Release);

        // Taking the seat is the death-transition token: exactly one of
        // `kill` and the router's exit path gets it, so exactly one
        // `ClusterDeath` goes out per spawn generation.
        let Some(seat) = self.seat.write().await.take() else {
            return;
        };
        seat.router.abort();
        seat.handle.kill();
        let _ = seat.status.send(SpawnStatus::Dead);

        self.heartbeat.remove_cluster(self.id, true).await;
        self.correlation.reject_cluster(self.id).await;

        let reason = reason.unwrap_or("unknown reason");
        self.bus.publish(
            Event::now(EventKind::Debug)
                .with_cluster(self.id)
                .with_reason(format!("cluster killed with reason: {reason}")),
        );
        self.bus.publish(
            Event::now(EventKind::ClusterDeath)
                .with_cluster(self.id)
                .with_reason(reason),
        );
    }

    /// Kill-then-spawn recovery cycle.
    ///
    /// Force-kills first if alive, waits `delay` (default: the manager's
    /// spawn delay), then spawns with `timeout` (default: the manager's spawn
    /// timeout). This is the sole recovery path after both manual kill and
    /// heartbeat-detected death.
    pub async fn respawn(
        self: &Arc<Self>,
        delay: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<(), ClusterError> {
        let delay = delay.unwrap_or(self.cfg.spawn_delay);
        let timeout = timeout.or_else(|| self.cfg.spawn_timeout_opt());

        if self.is_spawned().await {
            self.kill(Some("respawn")).await;
        }
        if delay > Duration::ZERO {
            time::sleep(delay).await;
        }
        self.spawn(timeout).await
    }

    /// Sends a fire-and-forget data message to the worker.
    pub async fn send(&self, message: Value) -> Result<(), ClusterError> {
        let handle = self.thread_handle().await?;
        handle
            .send(IpcMessage::Data { payload: message }.into())
            .await
    }

    /// Sends a request and waits for the correlated reply.
    ///
    /// A fresh nonce is generated per call; the pending entry settles exactly
    /// once — by the worker's reply, by `timeout`
    /// ([`ClusterError::RequestTimeout`]), or by the worker dying
    /// ([`ClusterError::WorkerDied`]).
    pub async fn request(
        &self,
        message: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ClusterError> {
        let nonce = Nonce::generate();
        self.correlated(
            IpcMessage::Request {
                nonce: nonce.clone(),
                payload: message,
            },
            nonce,
            timeout,
        )
        .await
    }

    /// Legacy: evaluates source text in the worker's own top-level context.
    ///
    /// Prefer [`Cluster::invoke`]; source text cannot be type-checked or
    /// sandboxed. Resolves to the serialized return value or rejects with
    /// [`ClusterError::Remote`] if the remote evaluation threw.
    pub async fn evaluate(
        &self,
        source: impl Into<String>,
        context: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClusterError> {
        let nonce = Nonce::generate();
        self.correlated(
            IpcMessage::Eval {
                nonce: nonce.clone(),
                source: source.into(),
                context,
            },
            nonce,
            timeout,
        )
        .await
    }

    /// Legacy: like [`Cluster::evaluate`], but bound to the hosted
    /// application instance inside the worker.
    pub async fn evaluate_on_host(
        &self,
        source: impl Into<String>,
        context: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClusterError> {
        let nonce = Nonce::generate();
        self.correlated(
            IpcMessage::EvalOnHost {
                nonce: nonce.clone(),
                source: source.into(),
                context,
            },
            nonce,
            timeout,
        )
        .await
    }

    /// Calls a statically named remote operation registered in the worker's
    /// [`RpcRegistry`](crate::protocol::RpcRegistry).
    pub async fn invoke(
        &self,
        op: impl Into<String>,
        args: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ClusterError> {
        let nonce = Nonce::generate();
        self.correlated(
            IpcMessage::Invoke {
                nonce: nonce.clone(),
                op: op.into(),
                args,
            },
            nonce,
            timeout,
        )
        .await
    }

    /// Broadcasts through the manager, excluding this cluster unless
    /// `include_self` is set.
    pub async fn broadcast(
        &self,
        message: Value,
        include_self: bool,
    ) -> Result<usize, ClusterError> {
        let manager = self.manager.upgrade().ok_or(ClusterError::SendFailed {
            detail: "manager has been dropped".into(),
        })?;
        let exclude = if include_self { Vec::new() } else { vec![self.id] };
        manager.broadcast(message, &exclude).await
    }

    /// Toggles maintenance mode: enable with a reason, disable without one.
    pub async fn trigger_maintenance(&self, reason: Option<&str>) -> Result<(), ClusterError> {
        let handle = self.thread_handle().await?;
        let msg = match reason {
            Some(reason) => IpcMessage::MaintenanceEnable {
                reason: reason.to_string(),
            },
            None => IpcMessage::MaintenanceDisable,
        };
        handle.send(msg.into()).await?;

        let mut ev = Event::now(EventKind::MaintenanceToggled).with_cluster(self.id);
        if let Some(reason) = reason {
            ev = ev.with_reason(reason);
        }
        self.bus.publish(ev);
        Ok(())
    }

    /// Answers a worker-originated request surfaced as a
    /// [`ClientRequest`](EventKind::ClientRequest) event.
    pub async fn reply_to(
        &self,
        nonce: Nonce,
        outcome: Result<Value, String>,
    ) -> Result<(), ClusterError> {
        let handle = self.thread_handle().await?;
        let msg = match outcome {
            Ok(result) => IpcMessage::Reply {
                nonce,
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(error) => IpcMessage::Reply {
                nonce,
                ok: false,
                result: None,
                error: Some(error),
            },
        };
        handle.send(msg.into()).await
    }

    // ---------------------------
    // Internals
    // ---------------------------

    /// Registers a pending entry, sends `msg`, and waits for settlement.
    /// The entry is created before the send so a fast reply cannot race past
    /// registration; a failed send settles it immediately.
    async fn correlated(
        &self,
        msg: IpcMessage,
        nonce: Nonce,
        timeout: Option<Duration>,
    ) -> Result<Value, ClusterError> {
        let handle = self.thread_handle().await?;
        let timeout = timeout.or_else(|| self.cfg.request_timeout_opt());

        let reply = self
            .correlation
            .create(nonce.clone(), self.id, timeout)
            .await;

        if let Err(err) = handle.send(msg.into()).await {
            self.correlation.settle(&nonce, Err(err.clone())).await;
            return Err(err);
        }
        reply.wait().await
    }

    /// Clones the live thread handle, or fails with `NoChildExists`.
    pub(crate) async fn thread_handle(&self) -> Result<Arc<dyn Thread>, ClusterError> {
        self.seat
            .read()
            .await
            .as_ref()
            .map(|seat| Arc::clone(&seat.handle))
            .ok_or(ClusterError::NoChildExists { id: self.id })
    }

    /// The typed startup configuration handed to the factory.
    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            cluster_id: self.id,
            shard_list: self.shard_list.to_vec(),
            total_shards: self.cfg.total_shards,
            total_clusters: self.cfg.total_clusters,
            queue_mode: self.cfg.queue_mode,
            manager_mode: self.cfg.mode,
            extra: self.cfg.cluster_data.clone(),
        }
    }

    /// Router: worker signalled readiness.
    pub(crate) async fn mark_ready(&self) {
        self.ready.store(true, AtomicOrdering::Release);
        self.touch_heartbeat();
        self.heartbeat.track(self.id).await;
    }

    /// Router: refresh the liveness clock.
    pub(crate) fn touch_heartbeat(&self) {
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Router: the thread exited; drop the seat without touching the router
    /// task (the router is the caller). Returns whether a seat was actually
    /// taken, i.e. whether the caller owns the death transition.
    pub(crate) async fn clear_seat(&self) -> bool {
        self.ready.store(false, AtomicOrdering::Release);
        self.seat.write().await.take().is_some()
    }
}
