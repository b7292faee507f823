//! # peerlink-relay
//!
//! Signaling relay for one-to-one WebRTC calls.
//!
//! Architecture:
//! - Each call is a "room", named by the clients
//! - Clients hold one WebSocket each; the relay knows them by connection id
//! - Offers and answers are routed to the single peer they name and are never
//!   inspected (media flows peer-to-peer, not through the relay)
//! - All room state lives in one in-memory table behind one lock

pub mod handler;
pub mod membership;
pub mod protocol;
pub mod router;
pub mod routes;

use axum::{routing::get, Router};
use peerlink_common::config::RelayConfig;
use std::sync::Arc;
use std::time::Instant;

pub use membership::MembershipStats;
pub use protocol::{ClientEvent, ServerEvent, SessionDescription};
pub use router::SignalRouter;

/// State shared by every connection handler.
pub struct RelayState {
    pub router: SignalRouter,
    pub config: RelayConfig,
    pub started_at: Instant,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            router: SignalRouter::new(config.room_capacity()),
            config,
            started_at: Instant::now(),
        }
    }
}

/// Relay server: owns the state and builds its HTTP/WebSocket router.
#[derive(Clone)]
pub struct RelayServer {
    pub state: Arc<RelayState>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            state: Arc::new(RelayState::new(config)),
        }
    }

    /// `/ws` for signaling plus `/health` and `/stats`.
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/ws", get(handler::ws_handler))
            .merge(routes::router())
            .with_state(self.state.clone())
    }

    pub async fn stats(&self) -> MembershipStats {
        self.state.router.stats().await
    }
}
