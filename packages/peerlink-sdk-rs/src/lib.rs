//! peerlink client SDK for Rust.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use peerlink_sdk::{EventKind, SignalingClient};
//!
//! #[tokio::main]
//! async fn main() -> peerlink_sdk::Result<()> {
//!     let client = SignalingClient::connect("ws://localhost:3000/ws").await?;
//!
//!     // Dropping the guard unsubscribes the handler.
//!     let _joined = client.on(EventKind::UserJoined, |event| println!("{event:?}"));
//!
//!     client.join("a@x.com", "42")?;
//!     tokio::signal::ctrl_c().await.ok();
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::{SignalingClient, Subscription};
pub use error::{Result, SdkError};
pub use types::*;
