//! Gateway opcodes, event names, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::SessionUser;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_HEARTBEAT_ACK: u8 = 6;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default)]
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }

    /// The event name when this is a dispatch.
    pub fn event_name(&self) -> Option<&str> {
        if self.op == OP_DISPATCH {
            self.t.as_deref()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

impl ClientMessage {
    pub fn identify(ticket: &str) -> Self {
        Self {
            op: OP_IDENTIFY,
            d: serde_json::json!({ "ticket": ticket }),
        }
    }

    pub fn heartbeat(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT,
            d: serde_json::json!({ "seq": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub ticket: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

/// Data carried by the READY dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,
    pub user: SessionUser,
    /// Milliseconds between client heartbeats.
    pub heartbeat_interval: u64,
}

/// Data carried by BOOKMARK_RESYNC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkResyncPayload {
    pub owner_id: String,
    /// How many events were skipped.
    pub skipped: u64,
}

/// Data carried by BOOKMARK_DELETE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkDeletePayload {
    pub id: String,
    pub owner_id: String,
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const BOOKMARK_CREATE: &'static str = "BOOKMARK_CREATE";
    pub const BOOKMARK_UPDATE: &'static str = "BOOKMARK_UPDATE";
    pub const BOOKMARK_DELETE: &'static str = "BOOKMARK_DELETE";
    /// Events for the owner were dropped; clients must refetch.
    pub const BOOKMARK_RESYNC: &'static str = "BOOKMARK_RESYNC";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_serializes_without_empty_fields() {
        let ack = serde_json::to_value(GatewayMessage::heartbeat_ack(4)).unwrap();
        assert_eq!(ack, serde_json::json!({ "op": 6, "d": { "ack": 4 } }));

        let msg = GatewayMessage::dispatch(EventName::READY, 1, serde_json::json!({}));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "READY");
        assert_eq!(json["s"], 1);
    }

    #[test]
    fn event_name_only_for_dispatch() {
        let msg: GatewayMessage =
            serde_json::from_str(r#"{"op":0,"t":"BOOKMARK_CREATE","s":2,"d":{}}"#).unwrap();
        assert_eq!(msg.event_name(), Some(EventName::BOOKMARK_CREATE));

        let ack: GatewayMessage = serde_json::from_str(r#"{"op":6,"d":{"ack":1}}"#).unwrap();
        assert_eq!(ack.event_name(), None);
    }
}
