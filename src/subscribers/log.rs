//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints controller events to stdout in a human-readable
//! format. This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [spawned] cluster=0
//! [ready] cluster=0
//! [death] cluster=0 exit_code=Some(1)
//! [heartbeat-missed] cluster=1 reason="missed 3 heartbeats"
//! [respawn-scheduled] cluster=1 delay_ms=800
//! [shutdown-requested]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::ClusterSpawned => {
                if let Some(cluster) = e.cluster {
                    println!("[spawned] cluster={cluster}");
                }
            }
            EventKind::ClusterReady => {
                if let Some(cluster) = e.cluster {
                    println!("[ready] cluster={cluster}");
                }
            }
            EventKind::ClusterDeath => {
                println!(
                    "[death] cluster={:?} exit_code={:?}",
                    e.cluster, e.exit_code
                );
            }
            EventKind::MessageReceived => {
                println!("[message] cluster={:?} payload={:?}", e.cluster, e.payload);
            }
            EventKind::ClientRequest => {
                println!(
                    "[client-request] cluster={:?} nonce={:?} payload={:?}",
                    e.cluster, e.nonce, e.payload
                );
            }
            EventKind::WorkerError => {
                println!("[worker-error] cluster={:?} err={:?}", e.cluster, e.reason);
            }
            EventKind::HeartbeatMissed => {
                println!(
                    "[heartbeat-missed] cluster={:?} reason={:?}",
                    e.cluster, e.reason
                );
            }
            EventKind::RespawnScheduled => {
                println!(
                    "[respawn-scheduled] cluster={:?} delay_ms={:?}",
                    e.cluster, e.delay_ms
                );
            }
            EventKind::MaintenanceToggled => {
                println!(
                    "[maintenance] cluster={:?} reason={:?}",
                    e.cluster, e.reason
                );
            }
            EventKind::SubscriberOverflow => {
                println!("[subscriber-overflow] {:?}", e.reason);
            }
            EventKind::SubscriberPanicked => {
                println!("[subscriber-panicked] {:?}", e.reason);
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::Debug => {
                println!("[debug] cluster={:?} {:?}", e.cluster, e.reason);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
