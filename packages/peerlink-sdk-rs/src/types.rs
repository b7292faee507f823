//! Wire types matching the relay's event envelope (`{"event": ..., "data": ...}`).
//!
//! Connection ids are kept as plain strings and SDP blobs as raw JSON, exactly
//! as a browser client would see them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Client → relay ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientRequest {
    #[serde(rename = "room:join")]
    JoinRoom { email: String, room: String },

    #[serde(rename = "room:leave")]
    LeaveRoom,

    #[serde(rename = "user:call")]
    Call { to: String, offer: Value },

    #[serde(rename = "call:accepted")]
    CallAccepted { to: String, ans: Value },

    #[serde(rename = "peer:nego:needed")]
    NegotiationNeeded { to: String, offer: Value },

    #[serde(rename = "peer:nego:done")]
    NegotiationDone { to: String, ans: Value },
}

// ── Relay → client ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RelayEvent {
    #[serde(rename = "session:ready")]
    SessionReady { id: String },

    /// Join acknowledgement (same wire name as the request).
    #[serde(rename = "room:join")]
    RoomJoined { email: String, room: String },

    #[serde(rename = "user:joined")]
    UserJoined { email: String, id: String },

    #[serde(rename = "user:left")]
    UserLeft { email: String, id: String },

    #[serde(rename = "incomming:call")]
    IncomingCall { from: String, offer: Value },

    #[serde(rename = "call:accepted")]
    CallAccepted { ans: Value },

    #[serde(rename = "peer:nego:needed")]
    NegotiationNeeded { from: String, offer: Value },

    #[serde(rename = "peer:nego:final")]
    NegotiationFinal { from: String, ans: Value },

    #[serde(rename = "error")]
    Error {
        code: u32,
        error: String,
        message: String,
        #[serde(default)]
        event: Option<String>,
        #[serde(default)]
        target: Option<String>,
    },
}

/// Discriminant of [`RelayEvent`], used to register handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionReady,
    RoomJoined,
    UserJoined,
    UserLeft,
    IncomingCall,
    CallAccepted,
    NegotiationNeeded,
    NegotiationFinal,
    Error,
}

impl RelayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SessionReady { .. } => EventKind::SessionReady,
            Self::RoomJoined { .. } => EventKind::RoomJoined,
            Self::UserJoined { .. } => EventKind::UserJoined,
            Self::UserLeft { .. } => EventKind::UserLeft,
            Self::IncomingCall { .. } => EventKind::IncomingCall,
            Self::CallAccepted { .. } => EventKind::CallAccepted,
            Self::NegotiationNeeded { .. } => EventKind::NegotiationNeeded,
            Self::NegotiationFinal { .. } => EventKind::NegotiationFinal,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leave_request_has_no_data() {
        let json = serde_json::to_value(ClientRequest::LeaveRoom).unwrap();
        assert_eq!(json, json!({"event": "room:leave"}));
    }

    #[test]
    fn parses_relay_error() {
        let event: RelayEvent = serde_json::from_value(json!({
            "event": "error",
            "data": {"code": 4004, "error": "TARGET_UNREACHABLE", "message": "gone", "target": "abc"}
        }))
        .unwrap();
        assert_eq!(event.kind(), EventKind::Error);
        assert!(matches!(event, RelayEvent::Error { event: None, target: Some(t), .. } if t == "abc"));
    }

    #[test]
    fn join_ack_and_request_share_a_name() {
        let request = serde_json::to_value(ClientRequest::JoinRoom {
            email: "a@x.com".into(),
            room: "42".into(),
        })
        .unwrap();
        let ack: RelayEvent = serde_json::from_value(request).unwrap();
        assert_eq!(ack.kind(), EventKind::RoomJoined);
    }
}
