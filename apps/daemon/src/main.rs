//! chatvox - headless chat narration service.
//!
//! Connects to a chat event source, reads chat messages aloud one at a time
//! and serves a local control API until interrupted.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chatvox_core::{bootstrap_services, EngineKind};
use clap::Parser;
use tokio::signal;

use crate::config::DaemonConfig;

/// chatvox - reads live chat aloud.
#[derive(Parser, Debug)]
#[command(name = "chatvox")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CHATVOX_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Chat event source URL (overrides config file).
    #[arg(short, long)]
    url: Option<String>,

    /// Control API port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Data directory for session snapshots.
    #[arg(short = 'd', long, env = "CHATVOX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Narration engine: command or silent (overrides config file).
    #[arg(short = 'e', long)]
    engine: Option<EngineKind>,

    /// Run without the control API.
    #[arg(long)]
    no_api: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("chatvox v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        DaemonConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(engine) = args.engine {
        config.engine = engine;
    }
    if args.no_api {
        config.api_enabled = false;
    }

    log::info!(
        "Configuration: url={}, engine={:?}, queue_capacity={}",
        config.url,
        config.engine,
        config.queue_capacity
    );
    if config.data_dir.is_none() {
        log::info!("No data directory configured - the session will not persist");
    }

    let services =
        bootstrap_services(config.to_core_config()).context("Failed to bootstrap services")?;

    if config.api_enabled {
        let addr = services
            .start_api()
            .await
            .with_context(|| format!("Failed to start control API on port {}", config.port))?;
        log::info!("Control API on http://{}", addr);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");
    services.shutdown().await;

    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
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
}
