//! Connection identifiers.
//!
//! Every transport session gets a UUID v7 at connect time. v7 ids are
//! time-sortable and carry 74 random bits, so an id is never handed out twice
//! within a process lifetime (or across relay nodes).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of one live relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Approximate time the id was allocated (millisecond precision).
    pub fn issued_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let bytes = self.0.as_bytes();
        // UUID v7: first 48 bits are a unix timestamp in milliseconds
        let ms = bytes[..6]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

        chrono::DateTime::from_timestamp_millis(ms as i64)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
