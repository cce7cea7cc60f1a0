//! Error types used by the clustervisor controller and the wire boundary.
//!
//! This module defines two main error enums:
//!
//! - [`ClusterError`] — errors raised by cluster lifecycle operations, the
//!   correlation registry, the broker, and remote workers.
//! - [`WireError`] — errors raised while encoding/decoding IPC wire messages.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging and
//! metrics, decoupling programmatic handling from human-readable text.

use std::time::Duration;
use thiserror::Error;

use crate::shard::ClusterId;

/// # Errors produced by cluster operations.
///
/// Anything the caller directly awaited (`spawn`, `send`, `request`,
/// `evaluate`, broker sends) surfaces as one of these; the controller itself
/// never crashes on them. Worker crashes with no pending caller surface only
/// as events plus the heartbeat monitor's respawn policy.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// `spawn` was called while the cluster already owns a live thread.
    #[error("cluster {id} has already been spawned")]
    AlreadySpawned {
        /// Id of the offending cluster.
        id: ClusterId,
    },

    /// The worker died before it signalled readiness.
    #[error("cluster {id} died before becoming ready")]
    ReadyDied {
        /// Id of the cluster that died.
        id: ClusterId,
    },

    /// The worker did not signal readiness within the spawn timeout.
    #[error("cluster {id} took longer than {timeout:?} to become ready")]
    ReadyTimeout {
        /// Id of the cluster that timed out.
        id: ClusterId,
        /// The spawn timeout that elapsed.
        timeout: Duration,
    },

    /// An operation requiring a live thread was invoked on an unspawned cluster.
    #[error("cluster {id} does not have a child process/worker")]
    NoChildExists {
        /// Id of the unspawned cluster.
        id: ClusterId,
    },

    /// A pending request expired before a matching reply arrived.
    #[error("request timed out after {timeout:?}")]
    RequestTimeout {
        /// The per-request timeout that elapsed.
        timeout: Duration,
    },

    /// The owning worker died while the request was still in flight.
    #[error("cluster {id} died with the request still pending")]
    WorkerDied {
        /// Id of the cluster that died.
        id: ClusterId,
    },

    /// A broker send targeted a cluster id that does not exist.
    #[error("invalid cluster id {id} provided")]
    InvalidClusterId {
        /// The unknown cluster id.
        id: ClusterId,
    },

    /// The thread factory failed to start a worker.
    #[error("cluster {id} failed to spawn: {detail}")]
    SpawnFailed {
        /// Id of the cluster being spawned.
        id: ClusterId,
        /// Backend-provided detail.
        detail: String,
    },

    /// The underlying transport rejected an outbound message.
    #[error("failed to deliver message: {detail}")]
    SendFailed {
        /// Transport-provided detail.
        detail: String,
    },

    /// The remote worker reported a failure while evaluating a request.
    #[error("remote execution failed: {detail}")]
    Remote {
        /// Worker-reported detail.
        detail: String,
    },

    /// OS termination-signal listeners could not be installed.
    #[error("failed to install signal handlers: {detail}")]
    Signal {
        /// OS-provided detail.
        detail: String,
    },

    /// Shard/cluster totals do not describe a valid topology.
    #[error("invalid topology: {detail}")]
    InvalidTopology {
        /// What was wrong with the provided totals.
        detail: String,
    },
}

impl ClusterError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use clustervisor::ClusterError;
    ///
    /// let err = ClusterError::NoChildExists { id: 3 };
    /// assert_eq!(err.as_label(), "no_child_exists");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ClusterError::AlreadySpawned { .. } => "already_spawned",
            ClusterError::ReadyDied { .. } => "ready_died",
            ClusterError::ReadyTimeout { .. } => "ready_timeout",
            ClusterError::NoChildExists { .. } => "no_child_exists",
            ClusterError::RequestTimeout { .. } => "request_timeout",
            ClusterError::WorkerDied { .. } => "worker_died",
            ClusterError::InvalidClusterId { .. } => "invalid_cluster_id",
            ClusterError::SpawnFailed { .. } => "spawn_failed",
            ClusterError::SendFailed { .. } => "send_failed",
            ClusterError::Remote { .. } => "remote_failed",
            ClusterError::Signal { .. } => "signal",
            ClusterError::InvalidTopology { .. } => "invalid_topology",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced at the wire boundary.
///
/// Serialization is validated at the boundary: unknown tags are rejected here
/// rather than silently misrouted.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WireError {
    /// A message could not be serialized for transport.
    #[error("failed to encode wire message: {0}")]
    Encode(#[source] serde_json::Error),

    /// An inbound payload was not a valid protocol or broker message.
    #[error("failed to decode wire message: {0}")]
    Decode(#[source] serde_json::Error),
}

impl WireError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WireError::Encode(_) => "wire_encode",
            WireError::Decode(_) => "wire_decode",
        }
    }
}
