//! Wire protocol — the events exchanged between browser clients and the relay.
//!
//! Every WebSocket text frame carries one JSON envelope:
//!
//! ```json
//! {"event": "user:call", "data": {"to": "<connection id>", "offer": {...}}}
//! ```
//!
//! Event names and payload field names are fixed by the existing browser
//! client (including the `incomming:call` spelling) and must not change.
//! SDP offers and answers are carried as opaque JSON and never inspected.

use peerlink_common::{ConnectionId, RelayError};
use serde::{Deserialize, Serialize};

/// An SDP offer or answer, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescription(pub serde_json::Value);

impl From<serde_json::Value> for SessionDescription {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Client → Server events.
///
/// `to` is kept as the raw string the client sent. Whether it names a live
/// connection is the router's call, not the decoder's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Join (or switch to) a room.
    #[serde(rename = "room:join")]
    JoinRoom {
        #[serde(default)]
        email: String,
        room: String,
    },

    /// Leave the current room without disconnecting. `data` may be absent,
    /// `null` or `{}`.
    #[serde(rename = "room:leave")]
    LeaveRoom,

    /// Start a call with `to`.
    #[serde(rename = "user:call")]
    Call {
        to: String,
        offer: SessionDescription,
    },

    /// Answer a call from `to`.
    #[serde(rename = "call:accepted")]
    CallAccepted {
        to: String,
        ans: SessionDescription,
    },

    /// Mid-call renegotiation offer.
    #[serde(rename = "peer:nego:needed")]
    NegotiationNeeded {
        to: String,
        offer: SessionDescription,
    },

    /// Answer to a renegotiation offer.
    #[serde(rename = "peer:nego:done")]
    NegotiationDone {
        to: String,
        ans: SessionDescription,
    },
}

impl ClientEvent {
    /// Decode one inbound text frame.
    pub fn decode(text: &str) -> Result<Self, RelayError> {
        let mut frame: serde_json::Value =
            serde_json::from_str(text).map_err(|e| RelayError::malformed(e.to_string()))?;

        // A unit variant only accepts a missing or null `data`; treat `{}` the same.
        if frame.get("event").and_then(serde_json::Value::as_str) == Some("room:leave")
            && frame
                .get("data")
                .and_then(serde_json::Value::as_object)
                .is_some_and(|data| data.is_empty())
        {
            if let Some(envelope) = frame.as_object_mut() {
                envelope.remove("data");
            }
        }

        serde_json::from_value(frame).map_err(|e| RelayError::malformed(e.to_string()))
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "room:join",
            Self::LeaveRoom => "room:leave",
            Self::Call { .. } => "user:call",
            Self::CallAccepted { .. } => "call:accepted",
            Self::NegotiationNeeded { .. } => "peer:nego:needed",
            Self::NegotiationDone { .. } => "peer:nego:done",
        }
    }

    /// Explicit routing target, for events addressed to a single peer.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Call { to, .. }
            | Self::CallAccepted { to, .. }
            | Self::NegotiationNeeded { to, .. }
            | Self::NegotiationDone { to, .. } => Some(to),
            Self::JoinRoom { .. } | Self::LeaveRoom => None,
        }
    }
}

/// Best-effort extraction of the `event` name from a frame that failed to decode,
/// so the error sent back can say which event it was about.
pub fn peek_event_name(text: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Envelope {
        event: String,
    }

    serde_json::from_str::<Envelope>(text).ok().map(|e| e.event)
}

/// Server → Client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// First frame on every connection: the id peers use to address this client.
    #[serde(rename = "session:ready")]
    SessionReady { id: ConnectionId },

    /// Acknowledgement to the joiner. Shares its wire name with the request.
    #[serde(rename = "room:join")]
    RoomJoined { email: String, room: String },

    /// Sent to the existing members of a room when someone joins.
    #[serde(rename = "user:joined")]
    UserJoined { email: String, id: ConnectionId },

    /// Sent to the remaining members of a room when someone leaves or disconnects.
    #[serde(rename = "user:left")]
    UserLeft { email: String, id: ConnectionId },

    #[serde(rename = "incomming:call")]
    IncomingCall {
        from: ConnectionId,
        offer: SessionDescription,
    },

    #[serde(rename = "call:accepted")]
    CallAccepted { ans: SessionDescription },

    #[serde(rename = "peer:nego:needed")]
    NegotiationNeeded {
        from: ConnectionId,
        offer: SessionDescription,
    },

    #[serde(rename = "peer:nego:final")]
    NegotiationFinal {
        from: ConnectionId,
        ans: SessionDescription,
    },

    /// A request from this client failed. Never sent to anyone else.
    #[serde(rename = "error")]
    Error {
        code: u32,
        error: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
}

impl ServerEvent {
    /// Build the `error` event reporting `err` for the client event named `event`.
    pub fn from_error(err: &RelayError, event: Option<String>) -> Self {
        Self::Error {
            code: err.code(),
            error: err.error_code().to_string(),
            message: err.public_message(),
            event,
            target: err.target().map(str::to_owned),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionReady { .. } => "session:ready",
            Self::RoomJoined { .. } => "room:join",
            Self::UserJoined { .. } => "user:joined",
            Self::UserLeft { .. } => "user:left",
            Self::IncomingCall { .. } => "incomming:call",
            Self::CallAccepted { .. } => "call:accepted",
            Self::NegotiationNeeded { .. } => "peer:nego:needed",
            Self::NegotiationFinal { .. } => "peer:nego:final",
            Self::Error { .. } => "error",
        }
    }

    /// Encode as one outbound text frame.
    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Internal(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_join_from_browser_client() {
        let event = ClientEvent::decode(r#"{"event":"room:join","data":{"email":"a@x.com","room":"42"}}"#)
            .unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                email: "a@x.com".into(),
                room: "42".into()
            }
        );
        assert_eq!(event.name(), "room:join");
        assert_eq!(event.target(), None);
    }

    #[test]
    fn join_without_email_is_accepted() {
        let event = ClientEvent::decode(r#"{"event":"room:join","data":{"room":"42"}}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { email, .. } if email.is_empty()));
    }

    #[test]
    fn leave_needs_no_payload() {
        for frame in [
            r#"{"event":"room:leave"}"#,
            r#"{"event":"room:leave","data":null}"#,
            r#"{"event":"room:leave","data":{}}"#,
            r#"{"data":{},"event":"room:leave"}"#,
        ] {
            assert_eq!(ClientEvent::decode(frame).unwrap(), ClientEvent::LeaveRoom, "{frame}");
        }
    }

    #[test]
    fn leave_with_unexpected_payload_is_malformed() {
        let err = ClientEvent::decode(r#"{"event":"room:leave","data":{"room":"42"}}"#).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_MESSAGE");
    }

    #[test]
    fn non_uuid_target_still_decodes() {
        for to in ["", "nobody"] {
            let frame = json!({"event": "peer:nego:needed", "data": {"to": to, "offer": {}}}).to_string();
            let event = ClientEvent::decode(&frame).unwrap();
            assert_eq!(event.target(), Some(to));
        }
    }

    #[test]
    fn offer_blob_is_passed_through_verbatim() {
        let to = ConnectionId::generate();
        let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 46117 2 IN IP4 127.0.0.1\r\n", "extra": [1, 2]});
        let frame = json!({"event": "user:call", "data": {"to": to, "offer": offer}}).to_string();

        let event = ClientEvent::decode(&frame).unwrap();
        assert_eq!(event.target(), Some(to.to_string().as_str()));
        let ClientEvent::Call { offer: decoded, .. } = event else {
            panic!("expected user:call");
        };
        assert_eq!(decoded.0, offer);
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let err = ClientEvent::decode(r#"{"event":"user:call","data":{"offer":{}}}"#).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_MESSAGE");
        assert!(err.to_string().contains("to"));
    }

    #[test]
    fn server_events_are_rejected_from_clients() {
        let id = ConnectionId::generate();
        let frame = json!({"event": "incomming:call", "data": {"from": id, "offer": {}}}).to_string();
        assert!(ClientEvent::decode(&frame).is_err());
        assert_eq!(peek_event_name(&frame).as_deref(), Some("incomming:call"));
        assert_eq!(peek_event_name("not json"), None);
    }

    #[test]
    fn outbound_shapes_match_the_browser_contract() {
        let from = ConnectionId::generate();
        let incoming = ServerEvent::IncomingCall {
            from,
            offer: json!({"sdp": "o1"}).into(),
        };
        let value: serde_json::Value = serde_json::from_str(&incoming.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "incomming:call", "data": {"from": from, "offer": {"sdp": "o1"}}})
        );

        let accepted = ServerEvent::CallAccepted {
            ans: json!({"sdp": "r1"}).into(),
        };
        let value: serde_json::Value = serde_json::from_str(&accepted.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "call:accepted", "data": {"ans": {"sdp": "r1"}}}));
    }

    #[test]
    fn ack_and_peer_notification_are_distinct_events() {
        let ack = ServerEvent::RoomJoined {
            email: "a@x.com".into(),
            room: "42".into(),
        };
        let joined = ServerEvent::UserJoined {
            email: "a@x.com".into(),
            id: ConnectionId::generate(),
        };
        assert_eq!(ack.name(), "room:join");
        assert_eq!(joined.name(), "user:joined");
    }

    #[test]
    fn error_event_omits_absent_fields() {
        let event = ServerEvent::from_error(&RelayError::InvalidRoom, None);
        let value: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "error", "data": {
                "code": 4001,
                "error": "INVALID_ROOM",
                "message": "Room id must not be empty",
            }})
        );
    }
}
