//! End-to-end tests over a scripted in-memory transport.
//!
//! `MockFactory` stands in for a real process/worker backend: each spawned
//! `MockThread` records every message the controller sends it and, depending
//! on its behavior, signals readiness, echoes replies, or dies on startup.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time;

use clustervisor::{
    Cluster, ClusterError, ClusterManager, EventKind, IpcMessage, ManagerConfig, Nonce,
    SpawnedThread, Thread, ThreadEvent, ThreadFactory, WireMessage, WorkerContext,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Behavior {
    /// Signals readiness right after spawn; never answers anything.
    AutoReady,
    /// Starts but never signals readiness.
    NeverReady,
    /// Exits with code 1 before signalling readiness.
    DieOnSpawn,
    /// Signals readiness and answers requests, evals, invokes, and heartbeats.
    Echo,
    /// Signals readiness on the first spawn only; every replacement hangs.
    ReadyOnce,
}

struct MockThread {
    behavior: Behavior,
    tx: mpsc::UnboundedSender<ThreadEvent>,
    inbound: Mutex<Vec<WireMessage>>,
    killed: AtomicBool,
}

impl MockThread {
    fn emit(&self, ev: ThreadEvent) {
        let _ = self.tx.send(ev);
    }

    fn inbound(&self) -> Vec<WireMessage> {
        self.inbound.lock().unwrap().clone()
    }
}

#[async_trait]
impl Thread for MockThread {
    async fn send(&self, message: WireMessage) -> Result<(), ClusterError> {
        if self.killed.load(Ordering::SeqCst) {
            return Err(ClusterError::SendFailed {
                detail: "thread killed".into(),
            });
        }
        self.inbound.lock().unwrap().push(message.clone());

        if self.behavior == Behavior::Echo {
            if let WireMessage::Protocol(msg) = message {
                match msg {
                    IpcMessage::Request { nonce, payload } => {
                        self.emit(ThreadEvent::Message(
                            IpcMessage::Reply {
                                nonce,
                                ok: true,
                                result: Some(payload),
                                error: None,
                            }
                            .into(),
                        ));
                    }
                    IpcMessage::Eval { nonce, source, .. }
                    | IpcMessage::EvalOnHost { nonce, source, .. } => {
                        self.emit(ThreadEvent::Message(
                            IpcMessage::Reply {
                                nonce,
                                ok: true,
                                result: Some(json!(source)),
                                error: None,
                            }
                            .into(),
                        ));
                    }
                    IpcMessage::Invoke { nonce, op, args } => {
                        self.emit(ThreadEvent::Message(
                            IpcMessage::Reply {
                                nonce,
                                ok: true,
                                result: Some(json!({ "op": op, "args": args })),
                                error: None,
                            }
                            .into(),
                        ));
                    }
                    IpcMessage::Heartbeat => {
                        self.emit(ThreadEvent::Message(IpcMessage::HeartbeatAck.into()));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        // Real backends report the exit of a killed worker too.
        self.emit(ThreadEvent::Exit(0));
    }
}

struct MockFactory {
    behavior: Behavior,
    threads: Mutex<Vec<Arc<MockThread>>>,
    contexts: Mutex<Vec<WorkerContext>>,
    spawns: AtomicUsize,
}

impl MockFactory {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            threads: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            spawns: AtomicUsize::new(0),
        })
    }

    fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    fn thread(&self, index: usize) -> Arc<MockThread> {
        Arc::clone(&self.threads.lock().unwrap()[index])
    }

    fn contexts(&self) -> Vec<WorkerContext> {
        self.contexts.lock().unwrap().clone()
    }
}

impl ThreadFactory for MockFactory {
    fn spawn(&self, ctx: WorkerContext) -> Result<SpawnedThread, ClusterError> {
        let previous_spawns = self.spawns.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(ctx);

        let (tx, rx) = mpsc::unbounded_channel();
        let thread = Arc::new(MockThread {
            behavior: self.behavior,
            tx,
            inbound: Mutex::new(Vec::new()),
            killed: AtomicBool::new(false),
        });
        match self.behavior {
            Behavior::AutoReady | Behavior::Echo => {
                thread.emit(ThreadEvent::Message(IpcMessage::Ready.into()));
            }
            Behavior::ReadyOnce => {
                if previous_spawns == 0 {
                    thread.emit(ThreadEvent::Message(IpcMessage::Ready.into()));
                }
            }
            Behavior::DieOnSpawn => thread.emit(ThreadEvent::Exit(1)),
            Behavior::NeverReady => {}
        }
        self.threads.lock().unwrap().push(Arc::clone(&thread));
        Ok(SpawnedThread {
            handle: thread,
            events: rx,
        })
    }
}

fn test_config() -> ManagerConfig {
    ManagerConfig {
        total_shards: 4,
        total_clusters: 2,
        spawn_delay: Duration::ZERO,
        spawn_timeout: Duration::from_secs(2),
        max_missed_heartbeats: 0,
        ..ManagerConfig::default()
    }
}

fn build(behavior: Behavior, cfg: ManagerConfig) -> (Arc<ClusterManager>, Arc<MockFactory>) {
    let factory = MockFactory::new(behavior);
    let manager = ClusterManager::builder(cfg, Arc::clone(&factory) as _).build();
    (manager, factory)
}

async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn first_cluster(manager: &Arc<ClusterManager>) -> Arc<Cluster> {
    manager.cluster(0).await.expect("cluster 0 exists")
}

#[tokio::test]
async fn spawn_assigns_contiguous_shard_chunks() {
    let (manager, factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    let contexts = factory.contexts();
    assert_eq!(contexts.len(), 2);
    assert_eq!(contexts[0].cluster_id, 0);
    assert_eq!(contexts[0].shard_list, vec![0, 1]);
    assert_eq!(contexts[1].cluster_id, 1);
    assert_eq!(contexts[1].shard_list, vec![2, 3]);
    assert_eq!(contexts[0].total_shards, 4);
    assert_eq!(contexts[0].total_clusters, 2);
}

#[tokio::test]
async fn spawn_without_readiness_gate_resolves_immediately() {
    let cfg = ManagerConfig {
        spawn_timeout: Duration::ZERO,
        ..test_config()
    };
    let (manager, _factory) = build(Behavior::NeverReady, cfg);
    manager.spawn_clusters().await.unwrap();

    let cluster = first_cluster(&manager).await;
    assert!(cluster.is_spawned().await);
    assert!(!cluster.is_ready());
}

#[tokio::test]
async fn spawn_with_gate_waits_for_ready() {
    let (manager, _factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    for cluster in manager.clusters().await {
        assert!(cluster.is_ready());
    }
}

#[tokio::test]
async fn spawn_times_out_when_worker_never_readies() {
    let cfg = ManagerConfig {
        spawn_timeout: Duration::from_millis(80),
        ..test_config()
    };
    let (manager, _factory) = build(Behavior::NeverReady, cfg);

    match manager.spawn_clusters().await {
        Err(ClusterError::ReadyTimeout { timeout, .. }) => {
            assert_eq!(timeout, Duration::from_millis(80));
        }
        other => panic!("expected ReadyTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn spawn_fails_when_worker_dies_before_ready() {
    let (manager, _factory) = build(Behavior::DieOnSpawn, test_config());
    match manager.spawn_clusters().await {
        Err(ClusterError::ReadyDied { .. }) => {}
        other => panic!("expected ReadyDied, got {other:?}"),
    }
}

#[tokio::test]
async fn double_spawn_is_rejected_without_side_effects() {
    let (manager, factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();
    assert_eq!(factory.spawn_count(), 2);

    let cluster = first_cluster(&manager).await;
    match cluster.spawn(None).await {
        Err(ClusterError::AlreadySpawned { id }) => assert_eq!(id, 0),
        other => panic!("expected AlreadySpawned, got {other:?}"),
    }
    // The factory was never consulted for the rejected attempt.
    assert_eq!(factory.spawn_count(), 2);
}

#[tokio::test]
async fn killed_cluster_refuses_io_until_respawned() {
    let (manager, factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    let cluster = first_cluster(&manager).await;
    cluster.kill(Some("test")).await;
    assert!(!cluster.is_ready());
    assert!(!cluster.is_spawned().await);

    match cluster.send(json!({"op": "noop"})).await {
        Err(ClusterError::NoChildExists { id }) => assert_eq!(id, 0),
        other => panic!("expected NoChildExists, got {other:?}"),
    }

    // Kill frees the seat, so a fresh spawn succeeds.
    cluster.spawn(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(factory.spawn_count(), 3);
    assert!(cluster.is_ready());
}

#[tokio::test]
async fn broadcast_reaches_every_ready_cluster() {
    let (manager, factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    let delivered = manager.broadcast(json!({"op": "refresh"}), &[]).await.unwrap();
    assert_eq!(delivered, 2);

    for index in 0..2 {
        let data_frames: Vec<_> = factory
            .thread(index)
            .inbound()
            .into_iter()
            .filter(|m| {
                matches!(m, WireMessage::Protocol(IpcMessage::Data { payload })
                    if payload == &json!({"op": "refresh"}))
            })
            .collect();
        assert_eq!(data_frames.len(), 1);
    }

    // Exclusion drops exactly the named cluster.
    let delivered = manager.broadcast(json!({"op": "again"}), &[0]).await.unwrap();
    assert_eq!(delivered, 1);
}

#[tokio::test]
async fn request_round_trips_through_the_worker() {
    let (manager, _factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    let cluster = first_cluster(&manager).await;
    let echoed = cluster
        .request(json!({"ask": 42}), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(echoed, json!({"ask": 42}));
}

#[tokio::test]
async fn request_times_out_against_a_silent_worker() {
    let (manager, _factory) = build(Behavior::AutoReady, test_config());
    manager.spawn_clusters().await.unwrap();

    let cluster = first_cluster(&manager).await;
    match cluster
        .request(json!(null), Some(Duration::from_millis(50)))
        .await
    {
        Err(ClusterError::RequestTimeout { timeout }) => {
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected RequestTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn worker_death_rejects_in_flight_requests() {
    let (manager, factory) = build(Behavior::AutoReady, test_config());
    manager.spawn_clusters().await.unwrap();

    let cluster = first_cluster(&manager).await;
    let pending = {
        let cluster = Arc::clone(&cluster);
        tokio::spawn(async move { cluster.request(json!("hang"), None).await })
    };

    // Let the request reach the worker, then kill it out from under the caller.
    let thread = factory.thread(0);
    wait_until(
        || {
            thread
                .inbound()
                .iter()
                .any(|m| matches!(m, WireMessage::Protocol(IpcMessage::Request { .. })))
        },
        "request delivery",
    )
    .await;
    thread.emit(ThreadEvent::Exit(9));

    match pending.await.unwrap() {
        Err(ClusterError::WorkerDied { id }) => assert_eq!(id, 0),
        other => panic!("expected WorkerDied, got {other:?}"),
    }

    let mut cleared = false;
    for _ in 0..300 {
        if !cluster.is_spawned().await {
            cleared = true;
            break;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cleared, "death should clear the seat");
}

#[tokio::test]
async fn invoke_and_evaluate_resolve_with_worker_results() {
    let (manager, _factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    let cluster = first_cluster(&manager).await;
    let invoked = cluster
        .invoke("stats", json!({"window": 60}), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(invoked, json!({"op": "stats", "args": {"window": 60}}));

    let evaluated = cluster
        .evaluate("this.guilds.size", None, Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(evaluated, json!("this.guilds.size"));
}

#[tokio::test]
async fn fleet_wide_calls_isolate_dead_clusters() {
    let (manager, _factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    manager.cluster(1).await.unwrap().kill(Some("test")).await;

    let results = manager
        .evaluate_on_all("this.status", None, Some(Duration::from_secs(1)))
        .await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, 0);
    assert_eq!(results[0].1.as_ref().unwrap(), &json!("this.status"));
    match &results[1].1 {
        Err(ClusterError::NoChildExists { id }) => assert_eq!(*id, 1),
        other => panic!("expected NoChildExists for cluster 1, got {other:?}"),
    }
}

#[tokio::test]
async fn broker_send_targets_one_cluster_or_all() {
    let (manager, factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    match manager.broker_send("jobs", json!(1), Some(99)).await {
        Err(ClusterError::InvalidClusterId { id }) => assert_eq!(id, 99),
        other => panic!("expected InvalidClusterId, got {other:?}"),
    }

    manager.broker_send("jobs", json!(1), Some(1)).await.unwrap();
    let targeted = |index: usize| {
        factory
            .thread(index)
            .inbound()
            .into_iter()
            .filter(|m| matches!(m, WireMessage::Broker(f) if f.broker == "jobs"))
            .count()
    };
    assert_eq!(targeted(0), 0);
    assert_eq!(targeted(1), 1);

    manager.broker_send("jobs", json!(2), None).await.unwrap();
    assert_eq!(targeted(0), 1);
    assert_eq!(targeted(1), 2);
}

#[tokio::test]
async fn worker_broker_frames_reach_controller_listeners() {
    let (manager, factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
    let sub = {
        let seen = Arc::clone(&seen);
        manager
            .broker_listen("metrics", move |payload| {
                seen.lock().unwrap().push(payload.clone())
            })
            .await
    };

    factory.thread(0).emit(ThreadEvent::Message(WireMessage::Broker(
        clustervisor::BrokerFrame {
            broker: "metrics".into(),
            data: json!({"cpu": 0.5}),
        },
    )));

    wait_until(|| !seen.lock().unwrap().is_empty(), "broker delivery").await;
    assert_eq!(seen.lock().unwrap()[0], json!({"cpu": 0.5}));

    // After unlisten, further frames are dropped silently.
    manager.broker_unlisten(sub).await;
    factory.thread(0).emit(ThreadEvent::Message(WireMessage::Broker(
        clustervisor::BrokerFrame {
            broker: "metrics".into(),
            data: json!({"cpu": 0.9}),
        },
    )));
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn worker_requests_surface_as_client_request_events() {
    let (manager, factory) = build(Behavior::Echo, test_config());
    let mut events = manager.bus().subscribe();
    manager.spawn_clusters().await.unwrap();

    let nonce = Nonce::from("testnonce0");
    factory.thread(0).emit(ThreadEvent::Message(
        IpcMessage::Request {
            nonce: nonce.clone(),
            payload: json!({"want": "topology"}),
        }
        .into(),
    ));

    let request_event = loop {
        let ev = time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event before deadline")
            .unwrap();
        if ev.kind == EventKind::ClientRequest {
            break ev;
        }
    };
    assert_eq!(request_event.cluster, Some(0));
    assert_eq!(request_event.nonce.as_ref(), Some(&nonce));
    assert_eq!(request_event.payload, Some(json!({"want": "topology"})));

    let cluster = first_cluster(&manager).await;
    cluster
        .reply_to(nonce.clone(), Ok(json!({"shards": 4})))
        .await
        .unwrap();

    let replied = factory.thread(0).inbound().into_iter().any(|m| {
        matches!(m, WireMessage::Protocol(IpcMessage::Reply { nonce: n, ok: true, .. })
            if n == nonce)
    });
    assert!(replied);
}

#[tokio::test]
async fn heartbeat_silence_forces_a_respawn() {
    let cfg = ManagerConfig {
        heartbeat_interval: Duration::from_millis(30),
        max_missed_heartbeats: 2,
        ..test_config()
    };
    // AutoReady workers never ack probes, so every cluster eventually misses.
    let (manager, factory) = build(Behavior::AutoReady, cfg);
    let mut events = manager.bus().subscribe();
    manager.spawn_clusters().await.unwrap();
    assert_eq!(factory.spawn_count(), 2);

    wait_until(|| factory.spawn_count() >= 3, "forced respawn").await;

    let missed = loop {
        let ev = time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event before deadline")
            .unwrap();
        if ev.kind == EventKind::HeartbeatMissed {
            break ev;
        }
    };
    assert!(missed.cluster.is_some());

    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_kills_the_whole_fleet() {
    let (manager, _factory) = build(Behavior::Echo, test_config());
    let mut events = manager.bus().subscribe();
    manager.spawn_clusters().await.unwrap();

    manager.shutdown().await;

    for cluster in manager.clusters().await {
        assert!(!cluster.is_spawned().await);
        assert!(!cluster.is_ready());
    }
    loop {
        let ev = time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event before deadline")
            .unwrap();
        if ev.kind == EventKind::ShutdownRequested {
            break;
        }
    }
}

#[tokio::test]
async fn kill_publishes_a_death_event() {
    let (manager, _factory) = build(Behavior::Echo, test_config());
    let mut events = manager.bus().subscribe();
    manager.spawn_clusters().await.unwrap();

    let cluster = first_cluster(&manager).await;
    cluster.kill(Some("operator request")).await;

    let death = loop {
        let ev = time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event before deadline")
            .unwrap();
        if ev.kind == EventKind::ClusterDeath {
            break ev;
        }
    };
    assert_eq!(death.cluster, Some(0));
    assert_eq!(death.reason.as_deref(), Some("operator request"));
    assert!(death.exit_code.is_none());

    // The backend's own exit notification must not turn into a second death.
    time::sleep(Duration::from_millis(100)).await;
    while let Ok(ev) = events.try_recv() {
        assert_ne!(ev.kind, EventKind::ClusterDeath, "duplicate death event");
    }
}

#[tokio::test]
async fn failed_forced_respawn_is_reported_and_retried() {
    let cfg = ManagerConfig {
        total_shards: 1,
        total_clusters: 1,
        heartbeat_interval: Duration::from_millis(30),
        max_missed_heartbeats: 2,
        spawn_timeout: Duration::from_millis(80),
        ..test_config()
    };
    // The first worker readies but never acks probes; every replacement hangs
    // before readiness, so each forced respawn times out.
    let (manager, factory) = build(Behavior::ReadyOnce, cfg);
    let mut events = manager.bus().subscribe();
    manager.spawn_clusters().await.unwrap();
    assert_eq!(factory.spawn_count(), 1);

    let error = loop {
        let ev = time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event before deadline")
            .unwrap();
        if ev.kind == EventKind::WorkerError {
            break ev;
        }
    };
    assert_eq!(error.cluster, Some(0));
    let reason = error.reason.as_deref().unwrap_or_default();
    assert!(
        reason.starts_with("forced respawn failed"),
        "unexpected reason: {reason}"
    );

    // Tracking re-arms after the failure, so the monitor tries again.
    wait_until(|| factory.spawn_count() >= 3, "respawn retry").await;

    manager.shutdown().await;
}

#[tokio::test]
async fn respawn_cycles_the_worker() {
    let (manager, factory) = build(Behavior::Echo, test_config());
    manager.spawn_clusters().await.unwrap();

    let cluster = first_cluster(&manager).await;
    cluster
        .respawn(Some(Duration::ZERO), Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(factory.spawn_count(), 3);
    assert!(cluster.is_ready());
}
