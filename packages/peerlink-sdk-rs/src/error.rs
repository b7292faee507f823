//! Error types for the peerlink SDK.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    /// An error from the WebSocket layer.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The relay connection is closed.
    #[error("Relay is not connected")]
    NotConnected,

    /// The relay did not open the session with `session:ready`.
    #[error("Handshake failed: {0}")]
    Handshake(String),
}

pub type Result<T> = std::result::Result<T, SdkError>;
