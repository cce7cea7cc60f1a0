//! IPC protocol: wire messages, correlation, and pub/sub brokers.
//!
//! Internal modules:
//! - [`nonce`]: random correlation tokens binding requests to replies;
//! - [`message`]: the closed wire-message sum type and broker frames;
//! - [`correlation`]: nonce-keyed registry of pending replies;
//! - [`broker`]: named pub/sub channels multiplexed over the same transport;
//! - [`rpc`]: statically named remote operations workers register handlers for.

mod broker;
mod correlation;
mod message;
mod nonce;
mod rpc;

pub use broker::{BrokerRegistry, Subscription, WorkerBroker};
pub use correlation::{CorrelationRegistry, PendingReply};
pub use message::{BrokerFrame, IpcMessage, WireMessage};
pub use nonce::Nonce;
pub use rpc::{RpcHandler, RpcRegistry};
