//! Credential store: API keys and the identities they resolve to
//!
//! Tokens never stay in memory in plain text. At load time each one is
//! replaced by an HMAC-SHA256 digest under a per-process random key, and
//! lookups compare digests with the MAC's constant-time verification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Resolved user context for a validated credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
}

impl Identity {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// One credential as written in a credential document
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialRecord {
    pub token: Secret<String>,
    pub user_id: String,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// RFC 3339 timestamp; TOML documents must quote it
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: bool,
}

impl CredentialRecord {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
            user_id: user_id.into(),
            scopes: BTreeSet::new(),
            expires_at: None,
            revoked: false,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn revoked(mut self) -> Self {
        self.revoked = true;
        self
    }
}

/// Top-level shape of a credential document
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialDocument {
    #[serde(default)]
    pub credentials: Vec<CredentialRecord>,
}

/// A credential after loading
#[derive(Debug, Clone)]
pub(crate) struct StoredCredential {
    digest: Vec<u8>,
    pub(crate) identity: Identity,
    expires_at: Option<Duration>,
    revoked: bool,
}

impl StoredCredential {
    /// Whether the credential can no longer be used at `now`
    pub(crate) fn is_expired(&self, now: Duration) -> bool {
        self.revoked || self.expires_at.is_some_and(|at| at <= now)
    }

    pub(crate) fn fingerprint(&self) -> String {
        hex::encode(&self.digest[..4])
    }
}

/// Immutable set of credentials loaded at startup
pub struct CredentialStore {
    mac: HmacSha256,
    entries: Vec<StoredCredential>,
    #[cfg(test)]
    comparisons: std::sync::atomic::AtomicUsize,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl CredentialStore {
    /// Build a store from records, rejecting empty fields and duplicate tokens
    pub fn from_records(records: Vec<CredentialRecord>) -> Result<Self> {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| GatewayError::CredentialStore(format!("Invalid digest key: {}", e)))?;

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            let token = record.token.expose_secret();
            if token.trim().is_empty() {
                return Err(GatewayError::CredentialStore(format!(
                    "Credential #{} has an empty token",
                    index
                )));
            }
            if record.user_id.trim().is_empty() {
                return Err(GatewayError::CredentialStore(format!(
                    "Credential #{} has an empty user_id",
                    index
                )));
            }

            let mut digest_mac = mac.clone();
            digest_mac.update(token.as_bytes());
            let digest = digest_mac.finalize().into_bytes().to_vec();

            if !seen.insert(digest.clone()) {
                return Err(GatewayError::CredentialStore(format!(
                    "Credential #{} duplicates an earlier token",
                    index
                )));
            }

            entries.push(StoredCredential {
                digest,
                identity: Identity {
                    user_id: record.user_id,
                    scopes: record.scopes,
                },
                expires_at: record
                    .expires_at
                    .map(|at| Duration::from_millis(at.timestamp_millis().max(0) as u64)),
                revoked: record.revoked,
            });
        }

        Ok(Self {
            mac,
            entries,
            #[cfg(test)]
            comparisons: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    /// Load from a credential source string (see [`provider_for`])
    pub async fn load(source: &str) -> Result<Self> {
        let provider = provider_for(source);
        let document = provider.fetch().await?;
        let store = Self::from_records(document.credentials)?;

        if store.is_empty() {
            warn!(source = %provider.describe(), "Credential store is empty; every protected request will be rejected");
        } else {
            info!(source = %provider.describe(), credentials = store.len(), "Credential store loaded");
        }
        Ok(store)
    }

    /// Find the credential for a token.
    ///
    /// Every stored digest is checked, whatever the input, so the cost of a
    /// lookup depends only on the number of stored credentials.
    pub(crate) fn lookup(&self, token: &[u8]) -> Option<&StoredCredential> {
        let mut mac = self.mac.clone();
        mac.update(token);

        let mut found = None;
        for entry in &self.entries {
            #[cfg(test)]
            self.comparisons
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            if mac.clone().verify_slice(&entry.digest).is_ok() {
                found = Some(entry);
            }
        }
        found
    }

    /// Digest comparisons made so far
    #[cfg(test)]
    pub(crate) fn comparisons(&self) -> usize {
        self.comparisons.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Somewhere a credential document can be fetched from
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Human-readable location, safe to log
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<CredentialDocument>;
}

/// JSON document held in an environment variable
pub struct EnvProvider {
    var: String,
}

#[async_trait]
impl CredentialProvider for EnvProvider {
    fn describe(&self) -> String {
        format!("env:{}", self.var)
    }

    async fn fetch(&self) -> Result<CredentialDocument> {
        let raw = std::env::var(&self.var).map_err(|e| {
            GatewayError::CredentialStore(format!("Cannot read {}: {}", self.describe(), e))
        })?;
        parse_json(&raw, &self.describe())
    }
}

/// JSON document served over HTTP(S)
pub struct HttpProvider {
    url: String,
}

#[async_trait]
impl CredentialProvider for HttpProvider {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<CredentialDocument> {
        let fail = |e: reqwest::Error| {
            GatewayError::CredentialStore(format!("Cannot fetch {}: {}", self.url, e))
        };

        reqwest::get(&self.url)
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?
            .json::<CredentialDocument>()
            .await
            .map_err(fail)
    }
}

/// JSON or TOML file on disk
pub struct FileProvider {
    path: PathBuf,
}

#[async_trait]
impl CredentialProvider for FileProvider {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<CredentialDocument> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GatewayError::CredentialStore(format!("Cannot read {}: {}", self.describe(), e))
        })?;

        let is_toml = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(&raw).map_err(|e| {
                GatewayError::CredentialStore(format!("Invalid TOML in {}: {}", self.describe(), e))
            })
        } else {
            parse_json(&raw, &self.describe())
        }
    }
}

fn parse_json(raw: &str, origin: &str) -> Result<CredentialDocument> {
    serde_json::from_str(raw)
        .map_err(|e| GatewayError::CredentialStore(format!("Invalid JSON in {}: {}", origin, e)))
}

/// Pick a provider for a `credential_source` value:
/// `env:VAR`, an `http(s)://` URL, or a file path.
pub fn provider_for(source: &str) -> Box<dyn CredentialProvider> {
    if let Some(var) = source.strip_prefix("env:") {
        Box::new(EnvProvider {
            var: var.to_string(),
        })
    } else if source.starts_with("http://") || source.starts_with("https://") {
        Box::new(HttpProvider {
            url: source.to_string(),
        })
    } else {
        Box::new(FileProvider {
            path: PathBuf::from(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!("credentials-{}.{}", uuid::Uuid::new_v4(), ext))
    }

    #[test]
    fn test_lookup_resolves_only_known_tokens() {
        let store = CredentialStore::from_records(vec![
            CredentialRecord::new("alpha-token", "u1").with_scopes(["forms:write"]),
            CredentialRecord::new("beta-token", "u2"),
        ])
        .unwrap();

        assert_eq!(store.len(), 2);
        let entry = store.lookup(b"alpha-token").unwrap();
        assert_eq!(entry.identity.user_id, "u1");
        assert!(entry.identity.has_scope("forms:write"));
        assert_eq!(store.lookup(b"beta-token").unwrap().identity.user_id, "u2");

        assert!(store.lookup(b"alpha-token ").is_none());
        assert!(store.lookup(b"").is_none());
        assert!(store.lookup(b"gamma-token").is_none());
    }

    #[test]
    fn test_duplicate_tokens_rejected() {
        let result = CredentialStore::from_records(vec![
            CredentialRecord::new("same", "u1"),
            CredentialRecord::new("same", "u2"),
        ]);
        assert!(matches!(result, Err(GatewayError::CredentialStore(_))));
    }

    #[test]
    fn test_empty_fields_rejected() {
        assert!(CredentialStore::from_records(vec![CredentialRecord::new("  ", "u1")]).is_err());
        assert!(CredentialStore::from_records(vec![CredentialRecord::new("tok", "")]).is_err());
    }

    #[test]
    fn test_expiry_and_revocation() {
        let expires = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let store = CredentialStore::from_records(vec![
            CredentialRecord::new("expiring", "u1").with_expiry(expires),
            CredentialRecord::new("revoked", "u2").revoked(),
        ])
        .unwrap();

        let at = Duration::from_secs(expires.timestamp() as u64);
        let entry = store.lookup(b"expiring").unwrap();
        assert!(!entry.is_expired(at - Duration::from_secs(1)));
        assert!(entry.is_expired(at));

        assert!(store.lookup(b"revoked").unwrap().is_expired(Duration::ZERO));
    }

    #[test]
    fn test_fingerprint_does_not_expose_token() {
        let store =
            CredentialStore::from_records(vec![CredentialRecord::new("secret-token", "u1")]).unwrap();
        let fingerprint = store.lookup(b"secret-token").unwrap().fingerprint();

        assert_eq!(fingerprint.len(), 8);
        assert!(!fingerprint.contains("secret"));
        assert!(!format!("{:?}", store).contains("secret"));
    }

    #[tokio::test]
    async fn test_load_json_file() {
        let path = temp_path("json");
        std::fs::write(
            &path,
            r#"{"credentials": [
                {"token": "abc-123-token", "user_id": "u1", "scopes": ["read"]},
                {"token": "old-token", "user_id": "u2", "expires_at": "2001-01-01T00:00:00Z"}
            ]}"#,
        )
        .unwrap();

        let store = CredentialStore::load(path.to_str().unwrap()).await.unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(store.len(), 2);
        assert!(store.lookup(b"old-token").unwrap().is_expired(Duration::from_secs(1_000_000_000)));
    }

    #[tokio::test]
    async fn test_load_toml_file() {
        let path = temp_path("toml");
        std::fs::write(
            &path,
            r#"
[[credentials]]
token = "toml-token"
user_id = "u1"
scopes = ["a", "b"]
expires_at = "2099-01-01T00:00:00Z"
"#,
        )
        .unwrap();

        let store = CredentialStore::load(path.to_str().unwrap()).await.unwrap();
        std::fs::remove_file(&path).ok();

        let entry = store.lookup(b"toml-token").unwrap();
        assert_eq!(entry.identity.scopes.len(), 2);
    }

    #[tokio::test]
    async fn test_load_from_env() {
        let var = format!("LANDING_TEST_CREDS_{}", uuid::Uuid::new_v4().simple());
        std::env::set_var(&var, r#"{"credentials": [{"token": "env-token", "user_id": "u9"}]}"#);

        let store = CredentialStore::load(&format!("env:{}", var)).await.unwrap();
        std::env::remove_var(&var);

        assert_eq!(store.lookup(b"env-token").unwrap().identity.user_id, "u9");
    }

    #[tokio::test]
    async fn test_unreadable_or_corrupt_store_is_fatal() {
        let missing = temp_path("json");
        assert!(CredentialStore::load(missing.to_str().unwrap()).await.is_err());

        let corrupt = temp_path("json");
        std::fs::write(&corrupt, "{not json").unwrap();
        let result = CredentialStore::load(corrupt.to_str().unwrap()).await;
        std::fs::remove_file(&corrupt).ok();
        assert!(matches!(result, Err(GatewayError::CredentialStore(_))));

        assert!(CredentialStore::load("env:LANDING_TEST_DEFINITELY_UNSET").await.is_err());
    }

    #[test]
    fn test_provider_selection() {
        assert_eq!(provider_for("env:CREDS").describe(), "env:CREDS");
        assert_eq!(
            provider_for("https://example.com/keys.json").describe(),
            "https://example.com/keys.json"
        );
        assert_eq!(provider_for("creds/keys.toml").describe(), "creds/keys.toml");
    }
}
