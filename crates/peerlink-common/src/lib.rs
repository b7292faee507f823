//! # peerlink-common
//!
//! Shared primitives for the peerlink crates: connection identifiers,
//! configuration loading and the relay error taxonomy.
//! No routing or membership logic lives here.

pub mod config;
pub mod error;
pub mod id;

pub use error::{RelayError, RelayResult};
pub use id::ConnectionId;
