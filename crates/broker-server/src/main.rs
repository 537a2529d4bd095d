//! MediaBroker binary
//!
//! Loads configuration, serves the HTTP API, then brings up the endpoint
//! servers and both gateway sessions.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use mediabroker_broker_core::{BrokerConfig, BrokerContext};
use mediabroker_server::build_router;
use mediabroker_server::logging::{log_welcome, parse_log_level, setup_logging, LoggingConfig};

#[derive(Debug, Parser)]
#[command(name = "mediabroker", version, about = "Media session broker for Janus gateways")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "MEDIABROKER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind_address`
    #[arg(short, long)]
    bind: Option<String>,

    #[arg(long, default_value = "info", env = "MEDIABROKER_LOG_LEVEL")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "mediabroker");
    if args.json_logs {
        logging = logging.with_json();
    }
    setup_logging(&logging)?;
    log_welcome(&logging, env!("CARGO_PKG_VERSION"));

    let mut config =
        BrokerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    info!(
        "Ports {}..{} ({} pairs), videoroom={}, streaming={}",
        config.ports.base_port,
        u32::from(config.ports.base_port) + 2 * config.ports.capacity - 1,
        config.ports.capacity,
        config.gateway.videoroom_url,
        config.gateway.streaming_url
    );

    let bind_address = config.server.bind_address.clone();
    let context = BrokerContext::from_config(config)?;
    let router = build_router(context.clone());

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    info!("HTTP server listening on {}", bind_address);

    let report = context.orchestrator().start().await?;
    if !report.video_room_ready || !report.streaming_ready {
        error!("Gateway services not ready; they will be retried on first use");
    }
    info!("Main endpoint: POST /api/sessions");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    context.orchestrator().shutdown().await;
    info!("MediaBroker shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
