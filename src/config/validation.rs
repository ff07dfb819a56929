//! Configuration validation

use super::*;
use crate::error::{GatewayError, Result};
use lettre::message::Mailbox;
use std::net::IpAddr;

/// Longest window accepted (one day)
const MAX_WINDOW_SECONDS: u64 = 86_400;

const LOG_FORMATS: &[&str] = &["json", "compact", "pretty"];

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_auth_config(&config.auth)?;
    validate_logging_config(&config.logging)?;
    validate_email_config(&config.email)?;
    Ok(())
}

/// Validate server configuration
fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        return Err(GatewayError::Config("Server host cannot be empty".to_string()));
    }

    if config.port == 0 {
        return Err(GatewayError::Config("Server port must be greater than 0".to_string()));
    }

    if config.max_body_size_kb > 10 * 1024 {
        return Err(GatewayError::Config(
            "Max body size too large (max: 10240 KB)".to_string(),
        ));
    }

    if config.cors_origins.iter().any(|o| o.trim().is_empty()) {
        return Err(GatewayError::Config("CORS origins cannot be empty strings".to_string()));
    }

    if let Some(bad) = config
        .trusted_proxies
        .iter()
        .find(|p| p.trim().parse::<IpAddr>().is_err())
    {
        return Err(GatewayError::Config(format!(
            "Trusted proxy '{}' is not an IP address",
            bad
        )));
    }

    if config.allowed_hosts.is_empty() || config.allowed_hosts.iter().any(|h| h.trim().is_empty()) {
        return Err(GatewayError::Config(
            "Allowed hosts must be non-empty (use \"*\" to accept any host)".to_string(),
        ));
    }

    if let Some(prefix) = &config.path_prefix {
        if !prefix.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "Path prefix '{}' must start with '/'",
                prefix
            )));
        }
    }

    Ok(())
}

/// Validate rate limit configuration
fn validate_rate_limit_config(config: &RateLimitSettings) -> Result<()> {
    if config.window_seconds == 0 {
        return Err(GatewayError::Config(
            "Rate limit window must be greater than 0 seconds".to_string(),
        ));
    }

    if config.window_seconds > MAX_WINDOW_SECONDS {
        return Err(GatewayError::Config(format!(
            "Rate limit window too large (max: {} seconds)",
            MAX_WINDOW_SECONDS
        )));
    }

    if config.limit == 0 {
        return Err(GatewayError::Config(
            "Rate limit must allow at least 1 request per window".to_string(),
        ));
    }

    Ok(())
}

/// Validate authentication configuration
fn validate_auth_config(config: &AuthSettings) -> Result<()> {
    let source = config.credential_source.trim();
    if source.is_empty() {
        return Err(GatewayError::Config("Credential source cannot be empty".to_string()));
    }

    if let Some(var) = source.strip_prefix("env:") {
        if var.is_empty() {
            return Err(GatewayError::Config(
                "Credential source env: needs a variable name".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    if !LOG_FORMATS.contains(&config.format.as_str()) {
        return Err(GatewayError::Config(format!(
            "Unknown log format '{}' (expected one of: {})",
            config.format,
            LOG_FORMATS.join(", ")
        )));
    }

    if config.level.trim().is_empty() {
        return Err(GatewayError::Config("Log level cannot be empty".to_string()));
    }

    Ok(())
}

/// Validate outbound mail configuration; only checked when delivery is on
fn validate_email_config(config: &EmailConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    if config.smtp_host.trim().is_empty() {
        return Err(GatewayError::Config("SMTP host cannot be empty".to_string()));
    }

    if config.smtp_port == 0 {
        return Err(GatewayError::Config("SMTP port must be greater than 0".to_string()));
    }

    if config.timeout_secs == 0 {
        return Err(GatewayError::Config("SMTP timeout must be greater than 0".to_string()));
    }

    for (field, address) in [("from", &config.from), ("to", &config.to)] {
        address.parse::<Mailbox>().map_err(|e| {
            GatewayError::Config(format!("Invalid email {} address '{}': {}", field, address, e))
        })?;
    }

    if config.smtp_password.is_some() && config.smtp_username.is_none() {
        return Err(GatewayError::Config(
            "SMTP password is set without a username".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = Config::default();
        config.rate_limit.window_seconds = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let mut config = Config::default();
        config.rate_limit.window_seconds = MAX_WINDOW_SECONDS + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = Config::default();
        config.rate_limit.limit = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_credential_source_rules() {
        let mut config = Config::default();
        config.auth.credential_source = "  ".to_string();
        assert!(validate_config(&config).is_err());

        config.auth.credential_source = "env:".to_string();
        assert!(validate_config(&config).is_err());

        config.auth.credential_source = "env:LANDING_CREDS".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_server_rules() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.server.cors_origins = vec!["".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_proxy_and_host_rules() {
        let mut config = Config::default();
        config.server.trusted_proxies = vec!["10.0.0.1".to_string(), "::1".to_string()];
        assert!(validate_config(&config).is_ok());

        config.server.trusted_proxies = vec!["proxy.internal".to_string()];
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.server.allowed_hosts = Vec::new();
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.server.path_prefix = Some("api".to_string());
        assert!(validate_config(&config).is_err());
        config.server.path_prefix = Some("/api".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_email_rules_apply_when_enabled() {
        let mut config = Config::default();
        config.email.to = "not an address".to_string();
        assert!(validate_config(&config).is_ok());

        config.email.enabled = true;
        assert!(validate_config(&config).is_err());

        config.email.to = "Sales <sales@example.com>".to_string();
        assert!(validate_config(&config).is_ok());

        config.email.smtp_password = Some(Secret::new("pw".to_string()));
        assert!(validate_config(&config).is_err());
        config.email.smtp_username = Some("mailer".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());
    }
}
