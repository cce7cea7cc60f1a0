//! # Statically named remote operations.
//!
//! [`RpcRegistry`] is the worker-side dispatch table for
//! [`Invoke`](super::IpcMessage::Invoke) messages: the hosted application
//! registers a handler per operation name, and the worker harness dispatches
//! inbound invokes through it, replying with the handler's serialized result.
//!
//! This is the primary remote-call surface; arbitrary source evaluation
//! ([`Eval`](super::IpcMessage::Eval)) remains only as a legacy compatibility
//! mode.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ClusterError;

/// Boxed async handler for one registered operation.
pub type RpcHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, String>> + Send>> + Send + Sync,
>;

/// Dispatch table mapping operation names to handlers.
pub struct RpcRegistry {
    handlers: RwLock<HashMap<String, RpcHandler>>,
}

impl Default for RpcRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcRegistry {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) the handler for `op`.
    pub async fn register<F, Fut>(&self, op: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let handler: RpcHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.handlers.write().await.insert(op.into(), handler);
    }

    /// Dispatches one invoke to the registered handler.
    ///
    /// Unknown operations and handler failures both surface as
    /// [`ClusterError::Remote`]; the caller turns either into a `reply` with
    /// `ok = false`.
    pub async fn dispatch(&self, op: &str, args: Value) -> Result<Value, ClusterError> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(op).cloned()
        };
        match handler {
            Some(h) => h(args).await.map_err(|detail| ClusterError::Remote { detail }),
            None => Err(ClusterError::Remote {
                detail: format!("unknown operation '{op}'"),
            }),
        }
    }
}
