//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > peerlink.toml > defaults.
//! The loaded [`AppConfig`] is passed explicitly to whoever needs it; there is no
//! process-global copy.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file name, looked up in the working directory without extension.
pub const DEFAULT_CONFIG_FILE: &str = "peerlink";

/// Load configuration from defaults, an optional config file and `PEERLINK__*` env vars.
///
/// When `file` is `None` the default `peerlink.{toml,json,yaml}` is used if present.
/// An explicitly named file must exist.
pub fn load(file: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let file_source = match file {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let cfg = defaults()?
        .add_source(file_source)
        // Environment variables (PEERLINK__SERVER__PORT, PEERLINK__RELAY__MAX_ROOM_MEMBERS, etc.)
        .add_source(
            config::Environment::with_prefix("PEERLINK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("relay.max_room_members", 2)?
        .set_default("relay.heartbeat_interval_secs", 25)?
        .set_default("relay.idle_timeout_secs", 60)?
        .set_default("relay.max_message_bytes", 65_536)?
        .set_default("log.filter", "peerlink=info,tower_http=info")?
        .set_default("log.format", "pretty")
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Render the effective configuration as TOML (for `--print-config`).
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 3000,
            },
            relay: RelayConfig::default(),
            log: LogConfig {
                filter: "peerlink=info,tower_http=info".into(),
                format: LogFormat::Pretty,
            },
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelayConfig {
    /// Maximum members per room; `0` disables the cap.
    pub max_room_members: usize,
    /// Interval between WebSocket pings sent to each client.
    pub heartbeat_interval_secs: u64,
    /// A connection that sends nothing (not even a pong) for this long is dropped.
    pub idle_timeout_secs: u64,
    /// Largest accepted inbound text frame.
    pub max_message_bytes: usize,
}

impl RelayConfig {
    /// Room capacity, or `None` when unlimited.
    pub fn room_capacity(&self) -> Option<usize> {
        (self.max_room_members > 0).then_some(self.max_room_members)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_room_members: 2,
            heartbeat_interval_secs: 25,
            idle_timeout_secs: 60,
            max_message_bytes: 65_536,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}
