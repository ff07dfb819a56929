//! Configuration management for the landing gateway

use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod loader;
pub mod validation;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Maximum request body size in KB (0 = unlimited)
    #[serde(default = "default_max_body_size")]
    pub max_body_size_kb: usize,

    /// Allowed CORS origins; CORS is off when empty
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Peers allowed to set `X-Forwarded-For`
    #[serde(default)]
    pub trusted_proxies: Vec<String>,

    /// Accepted `Host` values; `*` accepts any, `*.example.com` any subdomain
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Mount point when served behind a path-rewriting proxy, echoed by `/`
    #[serde(default)]
    pub path_prefix: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            max_body_size_kb: default_max_body_size(),
            cors_origins: Vec::new(),
            trusted_proxies: Vec::new(),
            allowed_hosts: default_allowed_hosts(),
            path_prefix: None,
        }
    }
}

/// Fixed-window rate limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Requests allowed per key per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            limit: default_limit(),
            enabled: true,
        }
    }
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// `env:VAR`, an `http(s)://` URL, or a JSON/TOML file path
    #[serde(default = "default_credential_source")]
    pub credential_source: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            credential_source: default_credential_source(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json, compact or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Outbound mail for contact submissions
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Deliver submissions by SMTP; when off they are only logged
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<Secret<String>>,

    /// STARTTLS on connect
    #[serde(default = "default_true")]
    pub use_tls: bool,

    #[serde(default = "default_email_from")]
    pub from: String,

    #[serde(default = "default_email_to")]
    pub to: String,

    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            use_tls: true,
            from: default_email_from(),
            to: default_email_to(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

// Default value functions
fn default_server_host() -> String { "0.0.0.0".to_string() }
fn default_server_port() -> u16 { 8080 }
fn default_max_body_size() -> usize { 64 }
fn default_window_seconds() -> u64 { 60 }
fn default_limit() -> u64 { 100 }
fn default_true() -> bool { true }
fn default_credential_source() -> String { "credentials.json".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }
fn default_allowed_hosts() -> Vec<String> { vec!["*".to_string()] }
fn default_smtp_host() -> String { "localhost".to_string() }
fn default_smtp_port() -> u16 { 587 }
fn default_email_from() -> String { "no-reply@example.com".to_string() }
fn default_email_to() -> String { "contact@example.com".to_string() }
fn default_smtp_timeout() -> u64 { 10 }

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides; the file may be absent
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config_with_env(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Validate this configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_config(self)
    }

    /// Socket address string to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
