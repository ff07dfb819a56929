//! Configuration loader with environment variable support

use super::Config;
use crate::error::Result;
use config::{Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix for environment overrides, e.g. `LANDING_API__RATE_LIMIT__LIMIT=5`
pub const ENV_PREFIX: &str = "LANDING_API";

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from(path.as_ref()))
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Load configuration from an optional TOML file with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .with_list_parse_key("server.trusted_proxies")
                .with_list_parse_key("server.allowed_hosts"),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Load `config/<environment>.env` into the process environment.
///
/// Variables already set are left alone. A missing file is not an error.
/// Returns the environment name.
pub fn load_environment_file(config_dir: impl AsRef<Path>) -> String {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "local".to_string());
    let path: PathBuf = config_dir.as_ref().join(format!("{}.env", environment));

    match dotenvy::from_path(&path) {
        Ok(()) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) => debug!(path = %path.display(), error = %e, "Environment file not loaded"),
    }
    environment
}
