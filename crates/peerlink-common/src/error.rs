//! Relay error taxonomy.
//!
//! Every variant is local to the connection that caused it: the relay reports
//! it back to that connection as an `error` event and carries on serving
//! everybody else.

/// Errors raised while handling a single client event.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // === Routing ===
    /// `target` is the id exactly as the client sent it; it may not even parse.
    #[error("Target {target:?} is not connected")]
    TargetUnreachable { target: String },

    // === Decoding ===
    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    // === Membership ===
    #[error("Room {room} is full ({capacity} members)")]
    RoomFull { room: String, capacity: usize },

    #[error("Room id must not be empty")]
    InvalidRoom,

    // === Infrastructure ===
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Numeric code sent on the wire, in the 4xxx (client) / 5xxx (server) range.
    pub fn code(&self) -> u32 {
        match self {
            Self::MalformedMessage { .. } => 4000,
            Self::InvalidRoom => 4001,
            Self::TargetUnreachable { .. } => 4004,
            Self::MessageTooLarge { .. } => 4009,
            Self::RoomFull { .. } => 4029,
            Self::Internal(_) => 5000,
        }
    }

    /// Error code string for programmatic handling by clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TargetUnreachable { .. } => "TARGET_UNREACHABLE",
            Self::MalformedMessage { .. } => "MALFORMED_MESSAGE",
            Self::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            Self::RoomFull { .. } => "ROOM_FULL",
            Self::InvalidRoom => "INVALID_ROOM",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show the client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(e) => {
                tracing::error!("Internal relay error: {e:#}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    /// The connection a routing failure was addressed to, if any.
    pub fn unreachable(target: impl Into<String>) -> Self {
        Self::TargetUnreachable {
            target: target.into(),
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Self::TargetUnreachable { target } => Some(target),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ConnectionId;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            RelayError::unreachable("nobody"),
            RelayError::malformed("missing field `to`"),
            RelayError::MessageTooLarge { size: 10, limit: 5 },
            RelayError::RoomFull {
                room: "42".into(),
                capacity: 2,
            },
            RelayError::InvalidRoom,
            RelayError::Internal(anyhow::anyhow!("boom")),
        ];
        let mut codes: Vec<u32> = errors.iter().map(RelayError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = RelayError::Internal(anyhow::anyhow!("lock poisoned at table.rs"));
        assert_eq!(err.public_message(), "An internal error occurred");
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn routing_failure_names_its_target() {
        let target = ConnectionId::generate().to_string();
        let err = RelayError::unreachable(target.clone());
        assert_eq!(err.target(), Some(target.as_str()));
        assert!(err.public_message().contains(&target));
        assert_eq!(RelayError::InvalidRoom.target(), None);
    }

    #[test]
    fn empty_target_is_still_a_routing_failure() {
        let err = RelayError::unreachable("");
        assert_eq!(err.code(), 4004);
        assert_eq!(err.public_message(), r#"Target "" is not connected"#);
    }
}
