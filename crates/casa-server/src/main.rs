//! casa controller
//!
//! Main entry point. The configuration directory is taken from the first
//! argument, then `CASA_CONFIG_DIR`, then the working directory.

use anyhow::{Context, Result};
use casa_config::ControllerConfig;
use casa_server::Controller;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CASA_CONFIG_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir();
    let config = ControllerConfig::load(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting casa");

    let controller = Controller::new(config, &config_dir);
    controller.start().await?;

    info!("casa is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    controller.shutdown().await?;
    Ok(())
}
