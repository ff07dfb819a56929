//! Health checks

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::middleware::{CredentialValidator, RateLimiter};

/// Health status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Component health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: Some(message.into()),
        }
    }
}

/// Health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,

    pub version: String,

    pub uptime_secs: u64,

    /// Component health checks by name
    pub checks: BTreeMap<String, ComponentHealth>,
}

/// Health checker
pub struct HealthChecker {
    start_time: Instant,
    version: String,
    validator: Option<Arc<CredentialValidator>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            validator: None,
            rate_limiter: None,
        }
    }

    /// Set credential validator for detailed checks
    pub fn with_validator(mut self, validator: Arc<CredentialValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set rate limiter for detailed checks
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Basic health: API availability only
    pub fn check_basic(&self) -> SystemHealth {
        let mut checks = BTreeMap::new();
        checks.insert("api".to_string(), ComponentHealth::healthy("OK"));
        self.report(checks)
    }

    /// Basic health plus credential store and rate limiter state
    pub fn check_detailed(&self) -> SystemHealth {
        let mut checks = self.check_basic().checks;

        if let Some(validator) = &self.validator {
            let count = validator.credential_count();
            let component = if count == 0 {
                ComponentHealth {
                    status: HealthStatus::Degraded,
                    message: Some("No credentials loaded".to_string()),
                }
            } else {
                ComponentHealth::healthy(format!("{} credentials loaded", count))
            };
            checks.insert("credential_store".to_string(), component);
        }

        if let Some(limiter) = &self.rate_limiter {
            let stats = limiter.stats();
            let message = if stats.enabled {
                format!(
                    "{} requests per {}s, {} keys tracked",
                    stats.limit, stats.window_seconds, stats.tracked_keys
                )
            } else {
                "disabled".to_string()
            };
            checks.insert("rate_limiter".to_string(), ComponentHealth::healthy(message));
        }

        self.report(checks)
    }

    fn report(&self, checks: BTreeMap<String, ComponentHealth>) -> SystemHealth {
        // Components can only degrade the report
        let status = if checks.values().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        debug!(?status, "Health check performed");

        SystemHealth {
            status,
            version: self.version.clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            checks,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{CredentialRecord, CredentialStore, RateLimitConfig};

    #[test]
    fn test_basic_health() {
        let health = HealthChecker::new().check_basic();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.checks.len(), 1);
        assert_eq!(health.checks["api"].message.as_deref(), Some("OK"));
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_detailed_health() {
        let store =
            CredentialStore::from_records(vec![CredentialRecord::new("tok-1", "u1")]).unwrap();
        let checker = HealthChecker::new()
            .with_validator(Arc::new(CredentialValidator::new(Arc::new(store))))
            .with_rate_limiter(Arc::new(RateLimiter::new(RateLimitConfig::default())));

        let health = checker.check_detailed();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.checks.len(), 3);
        assert!(health.checks["credential_store"]
            .message
            .as_deref()
            .unwrap()
            .starts_with("1 credentials"));
    }

    #[test]
    fn test_empty_store_is_degraded() {
        let store = CredentialStore::from_records(Vec::new()).unwrap();
        let checker =
            HealthChecker::new().with_validator(Arc::new(CredentialValidator::new(Arc::new(store))));

        assert_eq!(checker.check_detailed().status, HealthStatus::Degraded);
        assert_eq!(checker.check_basic().status, HealthStatus::Healthy);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let value = serde_json::to_value(HealthChecker::new().check_basic()).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(
            serde_json::to_value(HealthStatus::Degraded).unwrap(),
            serde_json::json!("degraded")
        );
    }
}
