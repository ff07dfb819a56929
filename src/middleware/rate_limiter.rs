//! Fixed-window rate limiting keyed by user or client IP

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::clock::Clock;
use crate::shutdown::ShutdownNotifier;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u64,
    /// Window length
    pub window_duration: Duration,
    /// Whether to enable rate limiting
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_duration: Duration::from_secs(60),
            enabled: true,
        }
    }
}

impl From<&crate::config::RateLimitSettings> for RateLimitConfig {
    fn from(settings: &crate::config::RateLimitSettings) -> Self {
        Self {
            max_requests: settings.limit,
            window_duration: Duration::from_secs(settings.window_seconds),
            enabled: settings.enabled,
        }
    }
}

/// Who a bucket belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateKey {
    User(String),
    Ip(Option<IpAddr>),
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateKey::User(id) => write!(f, "user:{}", id),
            RateKey::Ip(Some(ip)) => write!(f, "ip:{}", ip),
            RateKey::Ip(None) => f.write_str("ip:unknown"),
        }
    }
}

/// Per-key counter for one window
#[derive(Debug, Clone)]
struct RateBucket {
    count: u64,
    window_start: Duration,
}

/// Outcome of an allowed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Requests counted in the current window, this one included
    pub count: u64,
    /// Requests left before the limit is hit
    pub remaining: u64,
    /// Time until the window resets
    pub reset_after: Duration,
}

/// Fixed-window rate limiter.
///
/// Buckets are reset lazily the first time a key is seen in a new window.
/// A rejected request still increments its bucket, so clients that keep
/// hammering a limited key do not get a fresh burst at the boundary.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<DashMap<RateKey, RateBucket>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn window_millis(&self) -> u64 {
        (self.config.window_duration.as_millis() as u64).max(1)
    }

    /// Start of the window containing `now`
    pub fn window_start(&self, now: Duration) -> Duration {
        let window = self.window_millis();
        Duration::from_millis(now.as_millis() as u64 / window * window)
    }

    /// Count one request for `key` at `now` and decide whether it may proceed.
    ///
    /// The read-modify-write runs under the map entry's shard lock, so two
    /// requests for the same key are always serialized.
    pub fn admit(&self, key: &RateKey, now: Duration) -> Result<Admission, RateLimitError> {
        let window_start = self.window_start(now);
        let reset_after = (window_start + self.config.window_duration).saturating_sub(now);

        if !self.config.enabled {
            return Ok(Admission {
                count: 0,
                remaining: self.config.max_requests,
                reset_after,
            });
        }

        let count = {
            let mut entry = self.buckets.entry(key.clone()).or_insert(RateBucket {
                count: 0,
                window_start,
            });
            let bucket = entry.value_mut();

            if bucket.window_start != window_start {
                bucket.count = 0;
                bucket.window_start = window_start;
            }
            bucket.count += 1;
            bucket.count
        };

        if count > self.config.max_requests {
            warn!(
                key = %key,
                count,
                limit = self.config.max_requests,
                "Rate limit exceeded"
            );
            return Err(RateLimitError::LimitExceeded {
                retry_after: reset_after,
                limit: self.config.max_requests,
                window: self.config.window_duration,
            });
        }

        debug!(key = %key, count, limit = self.config.max_requests, "Request admitted");
        Ok(Admission {
            count,
            remaining: self.config.max_requests - count,
            reset_after,
        })
    }

    /// Current count and window start for a key
    pub fn usage(&self, key: &RateKey) -> Option<(u64, Duration)> {
        self.buckets
            .get(key)
            .map(|bucket| (bucket.count, bucket.window_start))
    }

    /// Forget a single key
    pub fn reset(&self, key: &RateKey) {
        self.buckets.remove(key);
        debug!(key = %key, "Rate limit reset");
    }

    /// Drop every bucket
    pub fn clear(&self) {
        self.buckets.clear();
        debug!("Rate limit buckets cleared");
    }

    /// Remove buckets whose window started at least two windows before `now`.
    ///
    /// Such a bucket would be reset by its next request anyway.
    /// Returns the number of buckets removed.
    pub fn evict_idle(&self, now: Duration) -> usize {
        let idle_after = self.config.window_duration * 2;
        let before = self.buckets.len();

        self.buckets
            .retain(|_, bucket| bucket.window_start + idle_after > now);

        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "Evicted idle rate limit buckets");
        }
        removed
    }

    /// Start background eviction, stopping when shutdown is signaled
    pub fn start_cleanup_task(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        mut shutdown: ShutdownNotifier,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.window_duration);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.evict_idle(clock.now());
                    }
                    _ = shutdown.wait() => {
                        debug!("Rate limit cleanup task stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Get statistics
    pub fn stats(&self) -> RateLimitStats {
        let tracked_keys = self.buckets.len();
        let total_requests: u64 = self.buckets.iter().map(|b| b.value().count).sum();

        RateLimitStats {
            tracked_keys,
            total_requests,
            limit: self.config.max_requests,
            window_seconds: self.config.window_duration.as_secs(),
            enabled: self.config.enabled,
        }
    }
}

/// Rate limit error
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit of {limit} requests per {}s exceeded", .window.as_secs())]
    LimitExceeded {
        retry_after: Duration,
        limit: u64,
        window: Duration,
    },
}

impl RateLimitError {
    /// Retry delay rounded up to whole seconds, never below one
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            RateLimitError::LimitExceeded { retry_after, .. } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                secs.max(1)
            }
        }
    }

    pub fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        match self {
            RateLimitError::LimitExceeded { limit, window, .. } => {
                details.insert("limit".to_string(), Value::from(*limit));
                details.insert("window_seconds".to_string(), Value::from(window.as_secs()));
            }
        }
        details.insert(
            "retry_after_seconds".to_string(),
            Value::from(self.retry_after_secs()),
        );
        details
    }
}

/// Rate limit statistics
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub tracked_keys: usize,
    pub total_requests: u64,
    pub limit: u64,
    pub window_seconds: u64,
    pub enabled: bool,
}
