//! Runtime core: fleet orchestration and cluster lifecycle.
//!
//! Internal modules:
//! - [`cluster`]: one worker's lifecycle state machine (spawn/kill/respawn and
//!   the send/request/evaluate surface);
//! - [`router`]: per-cluster inbound message classification and dispatch;
//! - [`heartbeat`]: liveness polling and forced-respawn policy;
//! - [`manager`]: the fleet coordinator owning all clusters;
//! - [`builder`]: wires the manager, subscriber listener, and monitor loop;
//! - [`shutdown`]: cross-platform termination signal handling.

mod builder;
mod cluster;
mod heartbeat;
mod manager;
mod router;
mod shutdown;

pub use builder::ClusterManagerBuilder;
pub use cluster::Cluster;
pub use heartbeat::HeartbeatMonitor;
pub use manager::ClusterManager;
