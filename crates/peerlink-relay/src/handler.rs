//! Signaling WebSocket handler.
//!
//! One task pair per client:
//! 1. Client connects to /ws and is greeted with `session:ready {id}`
//! 2. The sender task drains the connection's outbound queue onto the socket
//!    and pings the client every heartbeat interval
//! 3. The receive loop decodes frames and hands them to the router; decode
//!    and routing failures go back to this client only
//! 4. Close, transport error or idle timeout → unregister (forced leave)

use crate::protocol::{peek_event_name, ClientEvent, ServerEvent};
use crate::RelayState;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use peerlink_common::{ConnectionId, RelayError};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Slack above `max_message_bytes` before the transport drops the connection
/// outright. Frames inside the slack still get a `MESSAGE_TOO_LARGE` reply.
const FRAME_HEADROOM: usize = 16 * 1024;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    let transport_limit = state.config.max_message_bytes.saturating_add(FRAME_HEADROOM);
    ws.max_message_size(transport_limit)
        .max_frame_size(transport_limit)
        .on_upgrade(move |socket| handle_connection(socket, state))
}

/// Handle a single signaling WebSocket connection.
pub async fn handle_connection(socket: WebSocket, state: Arc<RelayState>) {
    let (sender, mut receiver) = socket.split();
    let (id, outbound) = state.router.connect().await;

    let send_task = tokio::spawn(run_sender(
        id,
        sender,
        outbound,
        state.config.heartbeat_interval(),
    ));

    let idle_timeout = state.config.idle_timeout();
    let max_bytes = state.config.max_message_bytes;

    // ── Receive loop ─────────────────────────────────────────────────────────
    loop {
        let msg = match tokio::time::timeout(idle_timeout, receiver.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection = %id, "Transport error: {e}");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(connection = %id, timeout = ?idle_timeout, "Connection idle, closing");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                handle_text(&state, id, text.as_str(), max_bytes).await;
            }
            Message::Binary(_) => {
                let err = RelayError::malformed("binary frames are not supported");
                state.router.report(id, &err, None).await;
            }
            Message::Close(_) => break,
            // Pings are answered by axum; any frame counts as liveness.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    state.router.disconnect(id).await;
    send_task.abort();
    tracing::info!(connection = %id, "Client disconnected from relay");
}

async fn handle_text(state: &RelayState, id: ConnectionId, text: &str, max_bytes: usize) {
    if text.len() > max_bytes {
        let err = RelayError::MessageTooLarge {
            size: text.len(),
            limit: max_bytes,
        };
        state.router.report(id, &err, None).await;
        return;
    }

    let event = match ClientEvent::decode(text) {
        Ok(event) => event,
        Err(err) => {
            state.router.report(id, &err, peek_event_name(text)).await;
            return;
        }
    };

    let name = event.name();
    if let Err(err) = state.router.dispatch(id, event).await {
        state.router.report(id, &err, Some(name.to_string())).await;
    }
}

/// Drain the outbound queue onto the socket, interleaving heartbeat pings.
async fn run_sender(
    id: ConnectionId,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerEvent>,
    heartbeat: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(heartbeat);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                let json = match event.encode() {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(connection = %id, event = event.name(), "{e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sender.close().await;
}
