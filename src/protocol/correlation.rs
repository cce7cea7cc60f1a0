//! # Nonce-keyed registry of pending replies.
//!
//! Every request/reply interaction registers a pending entry here before the
//! originating message is sent. An entry settles **exactly once**, through the
//! first of:
//!
//! - a matching [`Reply`](super::IpcMessage::Reply) message,
//! - expiry of its optional timeout ([`ClusterError::RequestTimeout`]),
//! - death of the owning cluster ([`ClusterError::WorkerDied`]).
//!
//! ## Rules
//! - A reply for an unknown nonce is a silent no-op (already settled or
//!   foreign correlation — not an error).
//! - A timeout and a late genuine reply racing for the same nonce resolve in
//!   favor of whichever settles first; the loser is discarded.
//! - The registry is scoped per-manager and shared across all its clusters;
//!   nonces are globally unique by construction.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time;

use super::nonce::Nonce;
use crate::error::ClusterError;
use crate::shard::ClusterId;

/// One pending request awaiting settlement.
struct Pending {
    /// Cluster whose worker is expected to answer.
    owner: ClusterId,
    /// Settlement handle; consumed on first settle.
    tx: oneshot::Sender<Result<Value, ClusterError>>,
    /// Expiry timer, armed only for finite positive timeouts.
    timer: Option<JoinHandle<()>>,
}

/// Future side of a pending entry, returned by [`CorrelationRegistry::create`].
pub struct PendingReply {
    owner: ClusterId,
    rx: oneshot::Receiver<Result<Value, ClusterError>>,
}

impl PendingReply {
    /// Waits for settlement.
    ///
    /// If the registry itself is torn down before the entry settles, the
    /// owning worker is gone and the outcome is [`ClusterError::WorkerDied`].
    pub async fn wait(self) -> Result<Value, ClusterError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_closed) => Err(ClusterError::WorkerDied { id: self.owner }),
        }
    }
}

/// Shared map of nonce → pending settlement handle.
pub struct CorrelationRegistry {
    pending: Mutex<HashMap<Nonce, Pending>>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new pending entry for `nonce` owned by cluster `owner`.
    ///
    /// If `timeout` is a finite positive duration, arms a timer that settles
    /// the entry with [`ClusterError::RequestTimeout`] on expiry. Call this
    /// immediately **before** sending the originating message.
    pub async fn create(
        self: &std::sync::Arc<Self>,
        nonce: Nonce,
        owner: ClusterId,
        timeout: Option<Duration>,
    ) -> PendingReply {
        let (tx, rx) = oneshot::channel();

        let timer = timeout.filter(|d| *d > Duration::ZERO).map(|d| {
            let registry = std::sync::Arc::clone(self);
            let key = nonce.clone();
            tokio::spawn(async move {
                time::sleep(d).await;
                registry
                    .settle(&key, Err(ClusterError::RequestTimeout { timeout: d }))
                    .await;
            })
        });

        let mut pending = self.pending.lock().await;
        pending.insert(nonce, Pending { owner, tx, timer });
        PendingReply { owner, rx }
    }

    /// Settles the entry for `nonce`, if it is still pending.
    ///
    /// Returns `true` if an entry was settled, `false` for an unknown nonce
    /// (benign: already settled or foreign).
    pub async fn settle(&self, nonce: &Nonce, outcome: Result<Value, ClusterError>) -> bool {
        let entry = {
            let mut pending = self.pending.lock().await;
            pending.remove(nonce)
        };
        match entry {
            Some(p) => {
                if let Some(timer) = p.timer {
                    timer.abort();
                }
                // Receiver may have been dropped; settlement is still "done".
                let _ = p.tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Rejects every pending entry owned by `owner` with
    /// [`ClusterError::WorkerDied`]. Called from the cluster death path so
    /// in-flight requests never dangle past their owner.
    pub async fn reject_cluster(&self, owner: ClusterId) {
        let dead: Vec<Pending> = {
            let mut pending = self.pending.lock().await;
            let keys: Vec<Nonce> = pending
                .iter()
                .filter(|(_, p)| p.owner == owner)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter().filter_map(|k| pending.remove(&k)).collect()
        };
        for p in dead {
            if let Some(timer) = p.timer {
                timer.abort();
            }
            let _ = p.tx.send(Err(ClusterError::WorkerDied { id: owner }));
        }
    }

    /// Number of currently pending entries.
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Returns true if no entries are pending.
    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_settles_at_most_once() {
        let reg = Arc::new(CorrelationRegistry::new());
        let nonce = Nonce::generate();
        let reply = reg.create(nonce.clone(), 0, None).await;

        assert!(reg.settle(&nonce, Ok(json!(1))).await);
        // Duplicate reply for an already-settled nonce is a no-op.
        assert!(!reg.settle(&nonce, Ok(json!(2))).await);

        assert_eq!(reply.wait().await.unwrap(), json!(1));
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_nonce_is_noop() {
        let reg = Arc::new(CorrelationRegistry::new());
        assert!(!reg.settle(&Nonce::generate(), Ok(json!(null))).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_entry() {
        let reg = Arc::new(CorrelationRegistry::new());
        let nonce = Nonce::generate();
        let reply = reg
            .create(nonce.clone(), 1, Some(Duration::from_millis(50)))
            .await;

        time::advance(Duration::from_millis(60)).await;
        match reply.wait().await {
            Err(ClusterError::RequestTimeout { timeout }) => {
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected RequestTimeout, got {other:?}"),
        }
        // A late genuine reply loses the race silently.
        assert!(!reg.settle(&nonce, Ok(json!(1))).await);
    }

    #[tokio::test]
    async fn test_zero_timeout_disables_timer() {
        let reg = Arc::new(CorrelationRegistry::new());
        let nonce = Nonce::generate();
        let _reply = reg
            .create(nonce.clone(), 1, Some(Duration::ZERO))
            .await;
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_owner_death_rejects_only_its_entries() {
        let reg = Arc::new(CorrelationRegistry::new());
        let dead = reg.create(Nonce::generate(), 7, None).await;
        let alive = reg.create(Nonce::generate(), 8, None).await;

        reg.reject_cluster(7).await;

        match dead.wait().await {
            Err(ClusterError::WorkerDied { id }) => assert_eq!(id, 7),
            other => panic!("expected WorkerDied, got {other:?}"),
        }
        assert_eq!(reg.len().await, 1);
        drop(alive);
    }
}
