//! Room membership — tracks which connection is in which room.
//!
//! This table is the relay's only shared mutable state. It keeps two indexes:
//! - `connections`: connection_id → Connection (quick "where is this client?")
//! - `rooms`: room_id → Room (quick "who's in this room?")
//!
//! The two indexes are always updated together by the methods below, which is
//! what keeps a connection in at most one room and keeps destroyed connections
//! out of every room. Callers hold the table behind a single lock.

use crate::protocol::ServerEvent;
use chrono::{DateTime, Utc};
use peerlink_common::{ConnectionId, RelayError, RelayResult};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

/// Outbound queue of one connection.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// One live transport session.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Display identifier from the last join. Untrusted, not unique.
    pub email: String,
    pub room: Option<String>,
    pub connected_at: DateTime<Utc>,
    outbound: Outbound,
}

/// A named set of connections sharing one call.
#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub members: HashSet<ConnectionId>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub room: String,
    pub email: String,
    /// Members that were already in the room.
    pub others: Vec<ConnectionId>,
    /// The room left on the way in, when switching rooms.
    pub left: Option<LeaveOutcome>,
    /// The connection was already in this room; nobody needs to be notified.
    pub rejoined: bool,
}

/// Result of leaving a room.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub room: String,
    pub email: String,
    pub remaining: Vec<ConnectionId>,
    /// The room became empty and was reclaimed.
    pub room_closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MembershipStats {
    pub connections: usize,
    pub rooms: usize,
    pub members_in_rooms: usize,
}

/// Connection registry plus room index.
#[derive(Debug)]
pub struct Membership {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<String, Room>,
    /// `None` means rooms are unbounded.
    capacity: Option<usize>,
}

impl Membership {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            connections: HashMap::new(),
            rooms: HashMap::new(),
            capacity,
        }
    }

    /// Register a freshly accepted connection. It starts outside any room.
    pub fn register(&mut self, id: ConnectionId, outbound: Outbound) {
        self.connections.insert(
            id,
            Connection {
                id,
                email: String::new(),
                room: None,
                connected_at: Utc::now(),
                outbound,
            },
        );
    }

    /// Forget a connection, leaving its room first. Returns what the leave did, if anything.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<LeaveOutcome> {
        let left = self.leave(id);
        self.connections.remove(&id);
        left
    }

    /// Put `id` into `room_id`, leaving its previous room first.
    ///
    /// Joining the room the connection is already in only refreshes its email.
    /// Capacity is checked before anything changes, so a `RoomFull` join leaves
    /// the connection where it was.
    pub fn join(&mut self, id: ConnectionId, room_id: &str, email: &str) -> RelayResult<JoinOutcome> {
        if room_id.is_empty() {
            return Err(RelayError::InvalidRoom);
        }

        let current = self
            .connections
            .get(&id)
            .ok_or_else(|| RelayError::Internal(anyhow::anyhow!("connection {id} is not registered")))?
            .room
            .clone();

        if current.as_deref() == Some(room_id) {
            if let Some(conn) = self.connections.get_mut(&id) {
                conn.email = email.to_string();
            }
            return Ok(JoinOutcome {
                room: room_id.to_string(),
                email: email.to_string(),
                others: self.others_in(room_id, id),
                left: None,
                rejoined: true,
            });
        }

        if let Some(capacity) = self.capacity {
            let size = self.rooms.get(room_id).map_or(0, |r| r.members.len());
            if size >= capacity {
                return Err(RelayError::RoomFull {
                    room: room_id.to_string(),
                    capacity,
                });
            }
        }

        let left = self.leave(id);

        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room {
                id: room_id.to_string(),
                members: HashSet::new(),
                created_at: Utc::now(),
            });
        let others: Vec<ConnectionId> = room.members.iter().copied().collect();
        room.members.insert(id);

        if let Some(conn) = self.connections.get_mut(&id) {
            conn.email = email.to_string();
            conn.room = Some(room_id.to_string());
        }

        tracing::info!(
            connection = %id,
            room = %room_id,
            members = others.len() + 1,
            "Connection joined room"
        );

        Ok(JoinOutcome {
            room: room_id.to_string(),
            email: email.to_string(),
            others,
            left,
            rejoined: false,
        })
    }

    /// Take `id` out of its room. No-op for connections outside any room.
    pub fn leave(&mut self, id: ConnectionId) -> Option<LeaveOutcome> {
        let conn = self.connections.get_mut(&id)?;
        let room_id = conn.room.take()?;
        let email = conn.email.clone();

        let mut remaining = Vec::new();
        let mut room_closed = false;
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.members.remove(&id);
            remaining.extend(room.members.iter().copied());
            if room.members.is_empty() {
                self.rooms.remove(&room_id);
                room_closed = true;
            }
        }

        tracing::info!(
            connection = %id,
            room = %room_id,
            room_closed,
            "Connection left room"
        );

        Some(LeaveOutcome {
            room: room_id,
            email,
            remaining,
            room_closed,
        })
    }

    /// Snapshot of a room's members. Unknown rooms are empty.
    pub fn members_of(&self, room_id: &str) -> HashSet<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    /// Room the connection is currently in.
    pub fn room_of(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id)?.room.as_deref()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Enqueue `event` on the outbound queue of `to`.
    ///
    /// Fails with `TargetUnreachable` when `to` is unknown or its queue is
    /// already closed because the connection is tearing down.
    pub fn deliver(&self, to: ConnectionId, event: ServerEvent) -> RelayResult<()> {
        let conn = self
            .connections
            .get(&to)
            .ok_or_else(|| RelayError::unreachable(to.to_string()))?;
        conn.outbound
            .send(event)
            .map_err(|_| RelayError::unreachable(to.to_string()))
    }

    pub fn stats(&self) -> MembershipStats {
        MembershipStats {
            connections: self.connections.len(),
            rooms: self.rooms.len(),
            members_in_rooms: self.rooms.values().map(|r| r.members.len()).sum(),
        }
    }

    fn others_in(&self, room_id: &str, id: ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|r| r.members.iter().copied().filter(|m| *m != id).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(table: &mut Membership) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::generate();
        table.register(id, tx);
        (id, rx)
    }

    #[test]
    fn first_join_creates_room() {
        let mut table = Membership::new(Some(2));
        let (a, _rx) = connect(&mut table);

        let outcome = table.join(a, "42", "a@x.com").unwrap();
        assert!(outcome.others.is_empty());
        assert!(outcome.left.is_none());
        assert!(!outcome.rejoined);
        assert_eq!(table.members_of("42"), HashSet::from([a]));
        assert_eq!(table.room_of(a), Some("42"));
        assert_eq!(table.connection(a).unwrap().email, "a@x.com");
    }

    #[test]
    fn second_join_reports_existing_member() {
        let mut table = Membership::new(Some(2));
        let (a, _ra) = connect(&mut table);
        let (b, _rb) = connect(&mut table);

        table.join(a, "42", "a@x.com").unwrap();
        let outcome = table.join(b, "42", "b@x.com").unwrap();
        assert_eq!(outcome.others, vec![a]);
        assert_eq!(table.members_of("42"), HashSet::from([a, b]));
    }

    #[test]
    fn rejoining_same_room_is_idempotent() {
        let mut table = Membership::new(Some(2));
        let (a, _ra) = connect(&mut table);
        let (b, _rb) = connect(&mut table);
        table.join(a, "42", "a@x.com").unwrap();
        table.join(b, "42", "b@x.com").unwrap();

        // A full room still accepts a rejoin from a member.
        let outcome = table.join(a, "42", "a2@x.com").unwrap();
        assert!(outcome.rejoined);
        assert_eq!(outcome.others, vec![b]);
        assert_eq!(table.members_of("42").len(), 2);
        assert_eq!(table.connection(a).unwrap().email, "a2@x.com");
    }

    #[test]
    fn switching_rooms_leaves_the_old_one() {
        let mut table = Membership::new(None);
        let (a, _ra) = connect(&mut table);
        let (b, _rb) = connect(&mut table);
        table.join(a, "1", "a@x.com").unwrap();
        table.join(b, "1", "b@x.com").unwrap();

        let outcome = table.join(a, "2", "a@x.com").unwrap();
        let left = outcome.left.expect("should have left room 1");
        assert_eq!(left.room, "1");
        assert_eq!(left.remaining, vec![b]);
        assert!(!left.room_closed);

        assert_eq!(table.members_of("1"), HashSet::from([b]));
        assert_eq!(table.members_of("2"), HashSet::from([a]));
    }

    #[test]
    fn full_room_rejects_without_side_effects() {
        let mut table = Membership::new(Some(2));
        let (a, _ra) = connect(&mut table);
        let (b, _rb) = connect(&mut table);
        let (c, _rc) = connect(&mut table);
        table.join(a, "42", "a@x.com").unwrap();
        table.join(b, "42", "b@x.com").unwrap();
        table.join(c, "7", "c@x.com").unwrap();

        let err = table.join(c, "42", "c@x.com").unwrap_err();
        assert!(matches!(err, RelayError::RoomFull { capacity: 2, .. }));
        assert_eq!(table.members_of("42"), HashSet::from([a, b]));
        assert_eq!(table.room_of(c), Some("7"));
    }

    #[test]
    fn unlimited_rooms_accept_more_than_two() {
        let mut table = Membership::new(None);
        let ids: Vec<_> = (0..5).map(|_| connect(&mut table)).collect();
        for (id, _) in &ids {
            table.join(*id, "big", "").unwrap();
        }
        assert_eq!(table.members_of("big").len(), 5);
    }

    #[test]
    fn empty_room_id_is_rejected() {
        let mut table = Membership::new(Some(2));
        let (a, _ra) = connect(&mut table);
        assert!(matches!(table.join(a, "", "a@x.com"), Err(RelayError::InvalidRoom)));
        assert_eq!(table.stats().rooms, 0);
    }

    #[test]
    fn unregistered_connection_cannot_join() {
        let mut table = Membership::new(Some(2));
        let err = table.join(ConnectionId::generate(), "42", "").unwrap_err();
        assert!(matches!(err, RelayError::Internal(_)));
    }

    #[test]
    fn leave_without_room_is_noop() {
        let mut table = Membership::new(Some(2));
        let (a, _ra) = connect(&mut table);
        assert_eq!(table.leave(a), None);
        assert_eq!(table.leave(ConnectionId::generate()), None);
    }

    #[test]
    fn last_leave_reclaims_room() {
        let mut table = Membership::new(Some(2));
        let (a, _ra) = connect(&mut table);
        table.join(a, "42", "a@x.com").unwrap();

        let left = table.unregister(a).unwrap();
        assert!(left.room_closed);
        assert!(left.remaining.is_empty());
        assert!(table.members_of("42").is_empty());
        assert_eq!(
            table.stats(),
            MembershipStats {
                connections: 0,
                rooms: 0,
                members_in_rooms: 0
            }
        );
    }

    #[test]
    fn deliver_to_unknown_or_closed_target_fails() {
        let mut table = Membership::new(Some(2));
        let (a, ra) = connect(&mut table);
        let ghost = ConnectionId::generate();

        let err = table
            .deliver(ghost, ServerEvent::SessionReady { id: ghost })
            .unwrap_err();
        assert_eq!(err.target(), Some(ghost.to_string().as_str()));

        drop(ra);
        let err = table.deliver(a, ServerEvent::SessionReady { id: a }).unwrap_err();
        assert_eq!(err.target(), Some(a.to_string().as_str()));
    }

    #[test]
    fn never_in_two_rooms_under_interleaved_joins() {
        let mut table = Membership::new(None);
        let conns: Vec<_> = (0..4).map(|_| connect(&mut table)).collect();
        let rooms = ["a", "b", "c"];

        for step in 0..60usize {
            let (id, _) = &conns[step % conns.len()];
            match step % 5 {
                0 => {
                    table.leave(*id);
                }
                n => {
                    table.join(*id, rooms[(step + n) % rooms.len()], "").unwrap();
                }
            }

            for (id, _) in &conns {
                let containing = rooms
                    .iter()
                    .filter(|r| table.members_of(r).contains(id))
                    .count();
                assert!(containing <= 1);
                assert_eq!(containing == 1, table.room_of(*id).is_some());
            }
            let stats = table.stats();
            assert!(stats.members_in_rooms <= conns.len());
        }
    }
}
