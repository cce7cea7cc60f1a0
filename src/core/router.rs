//! # Per-cluster inbound message router.
//!
//! Each live thread gets one router task consuming its
//! [`ThreadEvent`](crate::thread::ThreadEvent) stream in send order. The
//! router classifies wire messages, settles correlation entries, feeds the
//! heartbeat monitor, and turns worker lifecycle transitions into bus events.
//!
//! ## Rules
//! - Replies with an unknown nonce are dropped silently (late replies after
//!   timeout or respawn are expected).
//! - Thread exit — or the event channel closing without one — is death: the
//!   seat is cleared, heartbeat tracking stops, and every pending request
//!   owned by this cluster is rejected before `ClusterDeath` goes out.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::core::cluster::{Cluster, SpawnStatus};
use crate::error::ClusterError;
use crate::events::{Event, EventKind};
use crate::protocol::{IpcMessage, WireMessage};
use crate::thread::ThreadEvent;

/// Drives one thread's inbound stream until exit or channel close.
pub(crate) async fn run(
    cluster: Arc<Cluster>,
    mut events: mpsc::UnboundedReceiver<ThreadEvent>,
    status: watch::Sender<SpawnStatus>,
) {
    while let Some(ev) = events.recv().await {
        match ev {
            ThreadEvent::Message(msg) => route(&cluster, msg, &status).await,
            ThreadEvent::Error(detail) => {
                cluster.bus.publish(
                    Event::now(EventKind::WorkerError)
                        .with_cluster(cluster.id())
                        .with_reason(detail),
                );
            }
            ThreadEvent::Exit(code) => {
                on_death(&cluster, Some(code), &status).await;
                return;
            }
        }
    }
    // Backend dropped the channel without an exit notification: same as death.
    on_death(&cluster, None, &status).await;
}

async fn route(cluster: &Arc<Cluster>, msg: WireMessage, status: &watch::Sender<SpawnStatus>) {
    match msg {
        WireMessage::Broker(frame) => {
            cluster.broker.dispatch(&frame).await;
        }
        WireMessage::Protocol(msg) => match msg {
            IpcMessage::Ready => {
                cluster.mark_ready().await;
                let _ = status.send(SpawnStatus::Ready);
                cluster
                    .bus
                    .publish(Event::now(EventKind::ClusterReady).with_cluster(cluster.id()));
            }
            IpcMessage::Heartbeat => {
                cluster.touch_heartbeat();
                cluster.heartbeat.ack(cluster.id()).await;
                // Echo an ack so worker-side liveness checks see the controller.
                if let Ok(handle) = cluster.thread_handle().await {
                    let _ = handle.send(IpcMessage::HeartbeatAck.into()).await;
                }
            }
            IpcMessage::HeartbeatAck => {
                cluster.touch_heartbeat();
                cluster.heartbeat.ack(cluster.id()).await;
            }
            IpcMessage::Reply {
                nonce,
                ok,
                result,
                error,
            } => {
                let outcome = if ok {
                    Ok(result.unwrap_or(serde_json::Value::Null))
                } else {
                    Err(ClusterError::Remote {
                        detail: error.unwrap_or_else(|| "unspecified remote failure".into()),
                    })
                };
                cluster.correlation.settle(&nonce, outcome).await;
            }
            IpcMessage::Data { payload } => {
                cluster.bus.publish(
                    Event::now(EventKind::MessageReceived)
                        .with_cluster(cluster.id())
                        .with_payload(payload),
                );
            }
            IpcMessage::Request { nonce, payload } => {
                // Surfaced twice: once on the generic stream, once on the
                // request stream carrying the nonce to answer with.
                cluster.bus.publish(
                    Event::now(EventKind::MessageReceived)
                        .with_cluster(cluster.id())
                        .with_payload(payload.clone()),
                );
                cluster.bus.publish(
                    Event::now(EventKind::ClientRequest)
                        .with_cluster(cluster.id())
                        .with_payload(payload)
                        .with_nonce(nonce),
                );
            }
            // Controller-bound directions of controller-originated tags.
            // Nothing to do with them here; leave a breadcrumb.
            other => {
                cluster.bus.publish(
                    Event::now(EventKind::Debug)
                        .with_cluster(cluster.id())
                        .with_reason(format!("unexpected inbound message: {other:?}")),
                );
            }
        },
    }
}

/// Terminal cleanup shared by explicit exit and silent channel close.
async fn on_death(cluster: &Arc<Cluster>, exit_code: Option<i32>, status: &watch::Sender<SpawnStatus>) {
    // The seat is the death-transition token; if a concurrent kill already
    // took it, that kill owns cleanup and the ClusterDeath event.
    if !cluster.clear_seat().await {
        return;
    }
    let _ = status.send(SpawnStatus::Dead);

    cluster.heartbeat.remove_cluster(cluster.id(), false).await;
    cluster.correlation.reject_cluster(cluster.id()).await;

    let mut ev = Event::now(EventKind::ClusterDeath).with_cluster(cluster.id());
    if let Some(code) = exit_code {
        ev = ev.with_exit_code(code);
    }
    cluster.bus.publish(ev);
}
