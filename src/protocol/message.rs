//! # Wire messages exchanged with a worker thread.
//!
//! [`WireMessage`] is the single unit crossing the process boundary. It is an
//! untagged union of two orthogonal layers:
//!
//! - [`BrokerFrame`] — pub/sub traffic, recognized purely by the presence of
//!   the `broker` field alongside an opaque payload. No protocol tag is used
//!   for this path, keeping it orthogonal to the request/reply protocol.
//! - [`IpcMessage`] — the closed, `tag`-discriminated protocol sum.
//!
//! Serialization is validated at the boundary: an inbound object that carries
//! neither a known `tag` nor a `broker` field fails to decode rather than
//! being silently misrouted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::nonce::Nonce;
use crate::error::WireError;

/// Pub/sub frame: a channel name plus an opaque payload.
///
/// Distinguished from protocol traffic purely by carrying the `broker` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrokerFrame {
    /// Channel name the payload is published on.
    pub broker: String,
    /// Opaque payload delivered to every listener of the channel.
    #[serde(rename = "_data")]
    pub data: Value,
}

/// The closed protocol sum: every tagged message the controller and workers
/// exchange outside the broker layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "camelCase")]
pub enum IpcMessage {
    /// Fire-and-forget data message.
    Data {
        /// Caller-supplied payload.
        payload: Value,
    },

    /// Request expecting a correlated [`IpcMessage::Reply`].
    Request {
        /// Correlation token, unique among currently-pending requests.
        nonce: Nonce,
        /// Caller-supplied payload.
        payload: Value,
    },

    /// Reply to a request/eval/invoke message carrying the originating nonce.
    Reply {
        /// The originating request's nonce.
        nonce: Nonce,
        /// Whether the remote operation succeeded.
        ok: bool,
        /// Serialized return value (present when `ok`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Failure detail (present when `!ok`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Legacy: evaluate arbitrary source text in the worker's own top-level
    /// context. Prefer [`IpcMessage::Invoke`]; source text cannot be
    /// type-checked or sandboxed.
    Eval {
        /// Correlation token.
        nonce: Nonce,
        /// Source text to evaluate.
        source: String,
        /// Optional JSON-serializable context injected as a second argument.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<Value>,
    },

    /// Legacy: like [`IpcMessage::Eval`] but bound to the hosted application
    /// instance inside the worker.
    EvalOnHost {
        /// Correlation token.
        nonce: Nonce,
        /// Source text to evaluate.
        source: String,
        /// Optional JSON-serializable context.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<Value>,
    },

    /// Statically named remote operation; the worker dispatches it through its
    /// [`RpcRegistry`](super::RpcRegistry). Primary remote-call surface.
    Invoke {
        /// Correlation token.
        nonce: Nonce,
        /// Registered operation name.
        op: String,
        /// Operation arguments.
        args: Value,
    },

    /// Puts the worker into maintenance mode.
    MaintenanceEnable {
        /// Why maintenance was requested.
        reason: String,
    },

    /// Takes the worker out of maintenance mode.
    MaintenanceDisable,

    /// Worker → controller: the worker finished startup and is serving.
    Ready,

    /// Liveness probe (either direction).
    Heartbeat,

    /// Acknowledgment of a [`IpcMessage::Heartbeat`] probe.
    HeartbeatAck,
}

/// One wire unit: broker frame or tagged protocol message.
///
/// Broker frames are tried first since they are recognized by field presence,
/// not by tag; a protocol message never carries a `broker` field and a broker
/// frame never carries a `tag`, so the two layers cannot shadow each other.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    /// Pub/sub traffic.
    Broker(BrokerFrame),
    /// Request/reply protocol traffic.
    Protocol(IpcMessage),
}

impl WireMessage {
    /// Serializes the message for transport.
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }

    /// Deserializes an inbound payload, rejecting unknown shapes.
    pub fn decode(raw: &str) -> Result<Self, WireError> {
        serde_json::from_str(raw).map_err(WireError::Decode)
    }
}

impl From<IpcMessage> for WireMessage {
    fn from(msg: IpcMessage) -> Self {
        WireMessage::Protocol(msg)
    }
}

impl From<BrokerFrame> for WireMessage {
    fn from(frame: BrokerFrame) -> Self {
        WireMessage::Broker(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_message_shape() {
        let msg = WireMessage::from(IpcMessage::Data {
            payload: json!({"v": 1}),
        });
        let raw = msg.encode().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&raw).unwrap(),
            json!({"tag": "data", "payload": {"v": 1}})
        );
    }

    #[test]
    fn test_broker_frame_recognized_by_field() {
        let decoded =
            WireMessage::decode(r#"{"broker":"metrics","_data":{"cpu":0.5}}"#).unwrap();
        match decoded {
            WireMessage::Broker(frame) => {
                assert_eq!(frame.broker, "metrics");
                assert_eq!(frame.data, json!({"cpu": 0.5}));
            }
            WireMessage::Protocol(other) => panic!("misrouted as protocol: {other:?}"),
        }
    }

    #[test]
    fn test_protocol_not_shadowed_by_broker() {
        let decoded = WireMessage::decode(r#"{"tag":"ready"}"#).unwrap();
        assert_eq!(decoded, WireMessage::Protocol(IpcMessage::Ready));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!(WireMessage::decode(r#"{"tag":"mystery","payload":{}}"#).is_err());
        assert!(WireMessage::decode(r#"{"neither":"tag nor broker"}"#).is_err());
    }

    #[test]
    fn test_reply_round_trip() {
        let msg = WireMessage::from(IpcMessage::Reply {
            nonce: Nonce::from("abcDEF1234"),
            ok: false,
            result: None,
            error: Some("boom".into()),
        });
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_eval_context_optional() {
        let decoded = WireMessage::decode(
            r#"{"tag":"eval","nonce":"abcDEF1234","source":"this.status"}"#,
        )
        .unwrap();
        match decoded {
            WireMessage::Protocol(IpcMessage::Eval { context, .. }) => {
                assert!(context.is_none())
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }
}
