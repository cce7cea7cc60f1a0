//! # Named pub/sub channels over the IPC transport.
//!
//! Broker traffic shares the transport with the request/reply protocol but is
//! decoupled from it: frames carry only a channel name and an opaque payload
//! (see [`BrokerFrame`]). Two roles exist:
//!
//! - the **manager side** owns a [`BrokerRegistry`] for inbound frames and
//!   sends through [`ClusterManager::broker_send`](crate::ClusterManager::broker_send),
//!   targeting either the whole fleet or one specific cluster id;
//! - the **worker side** ([`WorkerBroker`]) can only send to its own
//!   controller.
//!
//! ## Rules
//! - All listeners of a channel are invoked, in registration order, for every
//!   frame on that channel.
//! - `listen` returns an explicit [`Subscription`] handle; registrations live
//!   until `unlisten` is called with it.
//! - Frames for channels with no listeners are dropped silently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::message::{BrokerFrame, WireMessage};
use crate::error::ClusterError;
use crate::thread::Thread;

/// Callback invoked for every frame on a listened channel.
pub type BrokerHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle identifying one `listen` registration; pass back to
/// [`BrokerRegistry::unlisten`] to remove exactly that listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    channel: String,
    id: u64,
}

impl Subscription {
    /// Channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Listener side of the broker, shared by both roles.
pub struct BrokerRegistry {
    listeners: RwLock<HashMap<String, Vec<(u64, BrokerHandler)>>>,
    next_id: AtomicU64,
}

impl Default for BrokerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a handler for `channel`. Handlers are invoked in
    /// registration order for every frame on the channel.
    pub async fn listen(
        &self,
        channel: impl Into<String>,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        let channel = channel.into();
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(channel.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription { channel, id }
    }

    /// Removes the registration identified by `sub`. Unknown handles are a
    /// no-op.
    pub async fn unlisten(&self, sub: &Subscription) {
        let mut listeners = self.listeners.write().await;
        if let Some(entries) = listeners.get_mut(&sub.channel) {
            entries.retain(|(id, _)| *id != sub.id);
            if entries.is_empty() {
                listeners.remove(&sub.channel);
            }
        }
    }

    /// Delivers a frame to every listener of its channel, in registration
    /// order. Not meant to be called by users; the message router feeds this.
    pub async fn dispatch(&self, frame: &BrokerFrame) {
        let handlers: Vec<BrokerHandler> = {
            let listeners = self.listeners.read().await;
            match listeners.get(&frame.broker) {
                Some(entries) => entries.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(&frame.data);
        }
    }
}

/// Worker-side broker endpoint: listens like the manager side but can only
/// send to its own controller link.
pub struct WorkerBroker {
    registry: Arc<BrokerRegistry>,
    link: Arc<dyn Thread>,
}

impl WorkerBroker {
    /// Creates a worker-side broker over the worker's controller link.
    pub fn new(link: Arc<dyn Thread>) -> Self {
        Self {
            registry: Arc::new(BrokerRegistry::new()),
            link,
        }
    }

    /// Listener registry for frames arriving from the controller.
    pub fn registry(&self) -> &Arc<BrokerRegistry> {
        &self.registry
    }

    /// Publishes a payload on `channel`, delivered to the controller's broker.
    pub async fn send(
        &self,
        channel: impl Into<String>,
        payload: Value,
    ) -> Result<(), ClusterError> {
        self.link
            .send(WireMessage::Broker(BrokerFrame {
                broker: channel.into(),
                data: payload,
            }))
            .await
    }
}
