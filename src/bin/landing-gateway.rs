//! Landing Gateway Server Binary
//!
//! Loads configuration, initializes logging and serves the gateway until
//! Ctrl+C or SIGTERM.

use anyhow::Context;
use landing_gateway::{config::loader::load_environment_file, observability, server, Config};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let environment = load_environment_file("config");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::from_file_with_env(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    observability::init_observability(&config.logging.level, &config.logging.format)
        .context("Failed to initialize logging")?;

    info!(
        environment = %environment,
        config_path = %config_path,
        version = env!("CARGO_PKG_VERSION"),
        "Starting Landing Gateway"
    );

    server::run(config).await.context("Gateway server failed")?;

    Ok(())
}
