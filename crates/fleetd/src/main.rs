//! Main application entry point for the fleet orchestrator daemon.
//!
//! Provides CLI interface, configuration loading, logging setup, and
//! orchestrator startup with graceful shutdown on termination signals.

mod cli;
mod config;
mod signals;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fleet_orchestrator::FleetOrchestrator;

use crate::cli::CliArgs;
use crate::config::AppConfig;

/// Initialize the logging system.
///
/// Structured logging via tracing with a level filter that respects
/// `RUST_LOG`, falling back to the configured level.
fn setup_logging(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json_format {
        registry.with(fmt::layer().json().with_target(false)).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;

    // Apply CLI overrides
    if let Some(bind_address) = args.bind_address {
        config.orchestrator.bind_address = bind_address;
    }
    if let Some(num_workers) = args.num_workers {
        config.workers.count = num_workers;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    if let Err(e) = config.validate() {
        anyhow::bail!("Configuration validation failed: {e}");
    }

    setup_logging(&config.logging.level, config.logging.json_format);

    info!("Fleet orchestrator v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: {} | {} worker(s) on ports {}.. | public {}",
        args.config_path.display(),
        config.workers.count,
        config.workers.base_port,
        config.orchestrator.bind_address,
    );

    let playlist = Arc::new(config.playlist());
    let orchestrator_config = config.to_orchestrator_config()?;
    orchestrator_config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;
    let orchestrator = Arc::new(FleetOrchestrator::with_playlist(
        orchestrator_config,
        playlist,
    ));

    let server_handle = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.start().await {
                error!("Orchestrator error: {e}");
                std::process::exit(1);
            }
        })
    };

    signals::wait_for_shutdown().await?;

    info!("Shutdown signal received, stopping orchestrator");
    orchestrator.shutdown();

    // Give the proxy and supervision tasks a moment to drain.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(3), server_handle).await;

    info!("Fleet orchestrator stopped");
    Ok(())
}
