//! Request gate: authentication then rate limiting, before any handler runs

use axum::http::{header, HeaderMap};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

use super::auth::CredentialValidator;
use super::clock::{Clock, SystemClock};
use super::credentials::Identity;
use super::rate_limiter::{Admission, RateKey, RateLimiter};
use crate::error::GateError;
use crate::observability::MetricsCollector;

/// The parts of an inbound request the gate looks at
#[derive(Debug, Clone, Default)]
pub struct GateRequest {
    pub authorization: Option<String>,
    pub client_ip: Option<IpAddr>,
}

/// Proxies whose `X-Forwarded-For` header is believed.
///
/// Requests from any other peer are keyed by the socket address, so a client
/// cannot pick its own rate-limit bucket by sending the header.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    addrs: Arc<[IpAddr]>,
}

impl TrustedProxies {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addrs: addrs.into_iter().collect(),
        }
    }

    /// Parse configured addresses, skipping (and logging) anything that is not an IP
    pub fn from_config(entries: &[String]) -> Self {
        Self::new(entries.iter().filter_map(|entry| {
            match entry.trim().parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!(entry = %entry, "Ignoring invalid trusted proxy address");
                    None
                }
            }
        }))
    }

    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.addrs.contains(ip)
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Resolve the client address for a request.
    ///
    /// An untrusted peer is the client. Behind a trusted proxy the
    /// `X-Forwarded-For` chain is read right to left and the first hop that is
    /// not itself a trusted proxy wins.
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
        let peer_ip = peer?.ip();
        if !self.is_trusted(&peer_ip) {
            return Some(peer_ip);
        }

        let chain: Vec<IpAddr> = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
            .collect();

        chain
            .iter()
            .rev()
            .find(|ip| !self.is_trusted(ip))
            .or_else(|| chain.first())
            .copied()
            .or(Some(peer_ip))
    }
}

impl GateRequest {
    /// Build from HTTP headers and the socket peer.
    ///
    /// The client IP is the peer address unless the peer is a trusted proxy.
    pub fn from_parts(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        proxies: &TrustedProxies,
    ) -> Self {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        Self {
            authorization,
            client_ip: proxies.client_ip(headers, peer),
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }
}

/// Composes credential validation and rate limiting
pub struct RequestGate {
    validator: Arc<CredentialValidator>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    proxies: TrustedProxies,
}

impl RequestGate {
    pub fn new(validator: Arc<CredentialValidator>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            validator,
            limiter,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(MetricsCollector::new()),
            proxies: TrustedProxies::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn trusted_proxies(&self) -> &TrustedProxies {
        &self.proxies
    }

    pub fn validator(&self) -> &Arc<CredentialValidator> {
        &self.validator
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Authenticate the caller, then charge their user bucket.
    ///
    /// The first failing stage decides the error; nothing is retried.
    pub fn authorize(&self, request: &GateRequest) -> Result<Identity, GateError> {
        let identity = match self.validator.validate_header(request.authorization.as_deref()) {
            Ok(identity) => identity,
            Err(e) => {
                let err = GateError::from(e);
                self.deny(&err, None, None);
                return Err(err);
            }
        };

        let key = RateKey::User(identity.user_id.clone());
        match self.limiter.admit(&key, self.clock.now()) {
            Ok(admission) => {
                self.allow(Some(&identity), &key, &admission);
                Ok(identity)
            }
            Err(e) => {
                let err = GateError::from(e);
                self.deny(&err, Some(&identity), Some(&key));
                Err(err)
            }
        }
    }

    /// Charge the caller's IP bucket, for routes that need no credential
    pub fn throttle(&self, request: &GateRequest) -> Result<Admission, GateError> {
        let key = RateKey::Ip(request.client_ip);
        match self.limiter.admit(&key, self.clock.now()) {
            Ok(admission) => {
                self.allow(None, &key, &admission);
                Ok(admission)
            }
            Err(e) => {
                let err = GateError::from(e);
                self.deny(&err, None, Some(&key));
                Err(err)
            }
        }
    }

    fn allow(&self, identity: Option<&Identity>, key: &RateKey, admission: &Admission) {
        self.metrics.record_allowed();
        info!(
            outcome = "allowed",
            user_id = identity.map(|i| i.user_id.as_str()),
            rate_key = %key,
            remaining = admission.remaining,
            "Gate decision"
        );
    }

    fn deny(&self, err: &GateError, identity: Option<&Identity>, key: Option<&RateKey>) {
        self.metrics.record_denied(err.kind());
        warn!(
            outcome = "denied",
            user_id = identity.map(|i| i.user_id.as_str()),
            rate_key = key.map(tracing::field::display),
            reason = err.kind().code(),
            "Gate decision"
        );
    }
}
