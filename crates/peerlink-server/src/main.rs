//! # peerlink
//!
//! Runs the signaling relay: a WebSocket endpoint at `/ws` for clients and
//! `/health` + `/stats` for monitoring, all on one listener.

use clap::Parser;
use peerlink_common::config::{self, AppConfig, LogFormat};
use peerlink_relay::RelayServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Command-line overrides. Anything not given here comes from config/env.
#[derive(Debug, Parser)]
#[command(name = "peerlink", version, about = "Signaling relay for peer-to-peer video calls")]
struct Cli {
    /// Config file (TOML/JSON/YAML). Defaults to ./peerlink.toml if present.
    #[arg(short, long, env = "PEERLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind.
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum members per room (0 = unlimited).
    #[arg(long)]
    max_room_members: Option<usize>,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(host) = &self.host {
            cfg.server.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(max) = self.max_room_members {
            cfg.relay.max_room_members = max;
        }
        if self.json_logs {
            cfg.log.format = LogFormat::Json;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_tracing(&config);

    tracing::info!("Starting peerlink v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        capacity = ?config.relay.room_capacity(),
        heartbeat = ?config.relay.heartbeat_interval(),
        idle_timeout = ?config.relay.idle_timeout(),
        "Relay configured"
    );

    let relay = RelayServer::new(config.relay.clone());
    let app = relay.build_router().layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Signaling relay listening on ws://{addr}/ws");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Relay stopped");
    Ok(())
}

/// Initialize tracing (structured logging). `RUST_LOG` wins over the config filter.
fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log.filter.as_str().into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
