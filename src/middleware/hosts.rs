//! `Host` header allow-list

use axum::http::{header, HeaderMap, Uri};
use std::sync::Arc;
use tracing::warn;

use super::validator::ValidationError;

/// Accepted host names.
///
/// `*` accepts anything. `*.example.com` accepts any subdomain of
/// `example.com` but not the bare domain. Ports are ignored.
#[derive(Debug, Clone)]
pub struct AllowedHosts {
    patterns: Arc<[String]>,
}

impl AllowedHosts {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// True when no host is ever rejected
    pub fn allows_any(&self) -> bool {
        self.patterns.iter().any(|p| p == "*")
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        let host = strip_port(host).to_ascii_lowercase();
        if host.is_empty() {
            return self.allows_any();
        }

        self.patterns.iter().any(|pattern| {
            pattern == "*"
                || *pattern == host
                || pattern
                    .strip_prefix('*')
                    .is_some_and(|suffix| suffix.starts_with('.') && host.ends_with(suffix))
        })
    }

    /// Check the `Host` header, falling back to the URI authority
    pub fn check(&self, headers: &HeaderMap, uri: &Uri) -> Result<(), ValidationError> {
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| uri.host())
            .unwrap_or("");

        if self.is_allowed(host) {
            Ok(())
        } else {
            warn!(host = %host, "Rejected request for unknown host");
            Err(ValidationError::InvalidHost(host.to_string()))
        }
    }
}

fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn hosts(patterns: &[&str]) -> AllowedHosts {
        AllowedHosts::new(&patterns.iter().map(|p| p.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_wildcard_accepts_everything() {
        let hosts = hosts(&["*"]);
        assert!(hosts.allows_any());
        assert!(hosts.is_allowed("anything.test:8080"));
        assert!(hosts.is_allowed(""));
    }

    #[test]
    fn test_exact_and_subdomain_patterns() {
        let hosts = hosts(&["example.com", "*.api.example.com"]);
        assert!(!hosts.allows_any());

        assert!(hosts.is_allowed("example.com"));
        assert!(hosts.is_allowed("EXAMPLE.com:443"));
        assert!(hosts.is_allowed("eu.api.example.com"));
        assert!(!hosts.is_allowed("api.example.com"));
        assert!(!hosts.is_allowed("www.example.com"));
        assert!(!hosts.is_allowed("evilexample.com"));
        assert!(!hosts.is_allowed(""));
    }

    #[test]
    fn test_ip_hosts() {
        let hosts = hosts(&["127.0.0.1", "::1"]);
        assert!(hosts.is_allowed("127.0.0.1:8080"));
        assert!(hosts.is_allowed("[::1]:8080"));
        assert!(hosts.is_allowed("::1"));
        assert!(!hosts.is_allowed("10.0.0.1"));
    }

    #[test]
    fn test_check_uses_host_header_then_uri() {
        let hosts = hosts(&["example.com"]);

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("example.com"));
        assert!(hosts.check(&headers, &Uri::from_static("/")).is_ok());

        let uri = Uri::from_static("https://example.com/v1/me");
        assert!(hosts.check(&HeaderMap::new(), &uri).is_ok());

        let err = hosts
            .check(&HeaderMap::new(), &Uri::from_static("/"))
            .unwrap_err();
        assert_eq!(err.field(), Some("host"));
    }
}
