//! Health and stats endpoints, for load balancers and monitoring.

use crate::RelayState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    connections: usize,
    rooms: usize,
    members_in_rooms: usize,
    room_capacity: Option<usize>,
}

pub fn router() -> Router<Arc<RelayState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
}

async fn health_check(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn stats(State(state): State<Arc<RelayState>>) -> Json<StatsResponse> {
    let stats = state.router.stats().await;
    Json(StatsResponse {
        connections: stats.connections,
        rooms: stats.rooms,
        members_in_rooms: stats.members_in_rooms,
        room_capacity: state.config.room_capacity(),
    })
}
