//! Message router — turns client events into deliveries.
//!
//! The router trusts the sender id bound to the transport and treats the
//! declared `to` id and every payload as opaque. Routed events go to exactly
//! the named target; membership notifications go to the other members of a
//! room, never to the joiner.

use crate::membership::{LeaveOutcome, Membership, MembershipStats};
use crate::protocol::{ClientEvent, ServerEvent};
use peerlink_common::{ConnectionId, RelayError, RelayResult};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Shared handle to the membership table and the routing logic over it.
#[derive(Clone)]
pub struct SignalRouter {
    table: Arc<RwLock<Membership>>,
}

impl SignalRouter {
    /// `capacity` caps room size; `None` leaves rooms unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            table: Arc::new(RwLock::new(Membership::new(capacity))),
        }
    }

    /// Register a new connection and queue its `session:ready` greeting.
    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        // Queued before the sender is shared, so it is always the first frame.
        let _ = tx.send(ServerEvent::SessionReady { id });
        self.table.write().await.register(id, tx);

        tracing::info!(connection = %id, "Connection registered");
        (id, rx)
    }

    /// Tear down a connection: leave its room and notify whoever remains.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut table = self.table.write().await;
        if let Some(left) = table.unregister(id) {
            notify_left(&table, id, &left);
        }
        tracing::info!(connection = %id, "Connection unregistered");
    }

    /// Handle one event from `from`.
    pub async fn dispatch(&self, from: ConnectionId, event: ClientEvent) -> RelayResult<()> {
        match event {
            ClientEvent::JoinRoom { email, room } => self.join(from, &room, &email).await,

            ClientEvent::LeaveRoom => {
                let mut table = self.table.write().await;
                if let Some(left) = table.leave(from) {
                    notify_left(&table, from, &left);
                }
                Ok(())
            }

            ClientEvent::Call { to, offer } => {
                self.route(from, &to, ServerEvent::IncomingCall { from, offer })
                    .await
            }

            ClientEvent::CallAccepted { to, ans } => {
                self.route(from, &to, ServerEvent::CallAccepted { ans }).await
            }

            ClientEvent::NegotiationNeeded { to, offer } => {
                self.route(from, &to, ServerEvent::NegotiationNeeded { from, offer })
                    .await
            }

            ClientEvent::NegotiationDone { to, ans } => {
                self.route(from, &to, ServerEvent::NegotiationFinal { from, ans })
                    .await
            }
        }
    }

    /// Send an `error` event for `err` back to `to`.
    pub async fn report(&self, to: ConnectionId, err: &RelayError, event: Option<String>) {
        tracing::warn!(
            connection = %to,
            event = event.as_deref().unwrap_or("-"),
            error = err.error_code(),
            "{err}"
        );
        let table = self.table.read().await;
        // The sender may already be gone; nothing left to tell it then.
        let _ = table.deliver(to, ServerEvent::from_error(err, event));
    }

    /// Snapshot of the members of `room`.
    pub async fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        let mut members: Vec<_> = self.table.read().await.members_of(room).into_iter().collect();
        members.sort_unstable();
        members
    }

    pub async fn room_of(&self, id: ConnectionId) -> Option<String> {
        self.table.read().await.room_of(id).map(str::to_owned)
    }

    pub async fn stats(&self) -> MembershipStats {
        self.table.read().await.stats()
    }

    async fn join(&self, id: ConnectionId, room: &str, email: &str) -> RelayResult<()> {
        // One write lock covers the whole join so peers hear about the joiner
        // before the joiner's ack is queued.
        let mut table = self.table.write().await;
        let outcome = table.join(id, room, email)?;

        if let Some(left) = &outcome.left {
            notify_left(&table, id, left);
        }

        if !outcome.rejoined {
            for other in &outcome.others {
                let event = ServerEvent::UserJoined {
                    email: outcome.email.clone(),
                    id,
                };
                if let Err(e) = table.deliver(*other, event) {
                    tracing::debug!(connection = %other, "Skipping peer notification: {e}");
                }
            }
        }

        table.deliver(
            id,
            ServerEvent::RoomJoined {
                email: outcome.email,
                room: outcome.room,
            },
        )
    }

    /// An id that does not parse can never name a live connection.
    async fn route(&self, from: ConnectionId, to: &str, event: ServerEvent) -> RelayResult<()> {
        let target: ConnectionId = to.parse().map_err(|_| RelayError::unreachable(to))?;
        let name = event.name();
        self.table.read().await.deliver(target, event)?;
        tracing::debug!(from = %from, target = %target, event = name, "Routed event");
        Ok(())
    }
}

fn notify_left(table: &Membership, id: ConnectionId, left: &LeaveOutcome) {
    for other in &left.remaining {
        let event = ServerEvent::UserLeft {
            email: left.email.clone(),
            id,
        };
        if let Err(e) = table.deliver(*other, event) {
            tracing::debug!(connection = %other, "Skipping leave notification: {e}");
        }
    }
}
