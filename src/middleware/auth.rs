//! Bearer token authentication

use std::sync::Arc;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::credentials::{CredentialStore, Identity};

/// Authentication scheme expected in the `Authorization` header
pub const BEARER_SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization: Bearer <token>` value.
///
/// The scheme is matched case-insensitively; anything other than exactly
/// one non-empty token after it is malformed.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) || parts.next().is_some() {
        return None;
    }
    Some(token)
}

/// Maps bearer tokens to identities
pub struct CredentialValidator {
    store: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl CredentialValidator {
    /// Create a validator backed by the system clock
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate a raw `Authorization` header value
    pub fn validate_header(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        match header.and_then(parse_bearer) {
            Some(token) => self.validate(token),
            None => {
                // Same lookup cost as a well-formed unknown token
                let _ = self.store.lookup(b"");
                debug!("Authorization header missing or malformed");
                Err(AuthError::MissingCredential)
            }
        }
    }

    /// Validate a bare token
    pub fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        let entry = self.store.lookup(token.as_bytes());

        if token.is_empty() {
            debug!("Empty bearer token");
            return Err(AuthError::MissingCredential);
        }

        let Some(entry) = entry else {
            warn!("Authentication failed: unknown credential");
            return Err(AuthError::InvalidCredential);
        };

        if entry.is_expired(self.clock.now()) {
            warn!(
                user_id = %entry.identity.user_id,
                fingerprint = %entry.fingerprint(),
                "Authentication failed: credential expired or revoked"
            );
            return Err(AuthError::ExpiredCredential);
        }

        debug!(
            user_id = %entry.identity.user_id,
            fingerprint = %entry.fingerprint(),
            "Authentication successful"
        );
        Ok(entry.identity.clone())
    }

    /// Number of loaded credentials
    pub fn credential_count(&self) -> usize {
        self.store.len()
    }
}

/// Authentication errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing API key")]
    MissingCredential,

    #[error("Invalid API key")]
    InvalidCredential,

    #[error("API key has expired or been revoked")]
    ExpiredCredential,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::clock::ManualClock;
    use crate::middleware::credentials::CredentialRecord;
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    fn validator_at(now: Duration) -> CredentialValidator {
        let expiry = DateTime::parse_from_rfc3339("2030-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let store = CredentialStore::from_records(vec![
            CredentialRecord::new("test-token-123", "u1").with_scopes(["contact:read"]),
            CredentialRecord::new("expiring-token", "u2").with_expiry(expiry),
            CredentialRecord::new("revoked-token", "u3").revoked(),
        ])
        .unwrap();
        CredentialValidator::with_clock(Arc::new(store), Arc::new(ManualClock::new(now)))
    }

    fn validator() -> CredentialValidator {
        // 2025-01-01T00:00:00Z
        validator_at(Duration::from_secs(1_735_689_600))
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("  Bearer   abc  "), Some("abc"));
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer abc def"), None);
        assert_eq!(parse_bearer("abc"), None);
        assert_eq!(parse_bearer(""), None);
    }

    #[test]
    fn test_valid_token() {
        let identity = validator().validate("test-token-123").unwrap();
        assert_eq!(identity.user_id, "u1");
        assert!(identity.has_scope("contact:read"));
    }

    #[test]
    fn test_valid_header() {
        let identity = validator()
            .validate_header(Some("Bearer test-token-123"))
            .unwrap();
        assert_eq!(identity.user_id, "u1");
    }

    #[test]
    fn test_missing_and_malformed_header() {
        let validator = validator();
        assert_eq!(validator.validate_header(None), Err(AuthError::MissingCredential));
        assert_eq!(
            validator.validate_header(Some("Token test-token-123")),
            Err(AuthError::MissingCredential)
        );
        assert_eq!(validator.validate_header(Some("Bearer")), Err(AuthError::MissingCredential));
        assert_eq!(validator.validate(""), Err(AuthError::MissingCredential));
        assert_eq!(validator.validate("   "), Err(AuthError::MissingCredential));
    }

    #[test]
    fn test_unknown_tokens_never_resolve() {
        let validator = validator();
        for token in ["abc", "test-token-12", "test-token-1234", "TEST-TOKEN-123", "u1"] {
            assert_eq!(validator.validate(token), Err(AuthError::InvalidCredential), "{}", token);
        }
        assert_eq!(
            validator.validate_header(Some("Bearer abc")),
            Err(AuthError::InvalidCredential)
        );
    }

    #[test]
    fn test_expired_and_revoked_tokens() {
        let before = validator_at(Duration::from_secs(1_900_000_000));
        assert_eq!(before.validate("expiring-token").unwrap().user_id, "u2");

        // 2030-06-01T00:00:00Z exactly
        let at = validator_at(Duration::from_secs(1_906_502_400));
        assert_eq!(at.validate("expiring-token"), Err(AuthError::ExpiredCredential));

        assert_eq!(validator().validate("revoked-token"), Err(AuthError::ExpiredCredential));
    }

    #[test]
    fn test_every_rejection_scans_the_whole_store() {
        let store = Arc::new(
            CredentialStore::from_records(vec![
                CredentialRecord::new("tok-a", "a"),
                CredentialRecord::new("tok-b", "b"),
                CredentialRecord::new("tok-c", "c"),
            ])
            .unwrap(),
        );
        let validator = CredentialValidator::new(store.clone());

        let scans = |check: &dyn Fn()| {
            let before = store.comparisons();
            check();
            store.comparisons() - before
        };

        let missing = scans(&|| assert!(validator.validate_header(None).is_err()));
        let wrong_scheme = scans(&|| assert!(validator.validate_header(Some("Basic x")).is_err()));
        let empty = scans(&|| assert!(validator.validate("").is_err()));
        let unknown = scans(&|| assert!(validator.validate("unknown").is_err()));
        let valid = scans(&|| assert!(validator.validate("tok-a").is_ok()));

        assert_eq!(missing, 3);
        assert_eq!(wrong_scheme, 3);
        assert_eq!(empty, 3);
        assert_eq!(unknown, 3);
        // A match does not stop the scan early
        assert_eq!(valid, 3);
    }

    #[test]
    fn test_credential_count() {
        assert_eq!(validator().credential_count(), 3);
    }
}
