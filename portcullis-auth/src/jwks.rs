//! JWKS (JSON Web Key Set) fetching and caching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

use crate::error::{AuthError, Result};

/// A provider public key, pinned to the algorithm it was published for.
#[derive(Clone, Debug)]
pub struct VerifyingKey {
    key: DecodingKey,
    algorithm: Option<Algorithm>,
}

impl VerifyingKey {
    /// A key usable with any allowed algorithm.
    pub fn new(key: DecodingKey) -> Self {
        Self { key, algorithm: None }
    }

    /// Restrict the key to `algorithm`.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn key(&self) -> &DecodingKey {
        &self.key
    }

    /// The JWK `alg`, when the provider published one.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Whether a token signed with `alg` may be verified by this key.
    pub fn permits(&self, alg: Algorithm) -> bool {
        self.algorithm.is_none_or(|pinned| pinned == alg)
    }
}

/// Resolves a token's key-id to the public key that must have signed it.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn get_key(&self, kid: &str) -> Result<VerifyingKey>;
}

/// One complete, immutable snapshot of the provider's signing keys.
struct KeySet {
    keys: HashMap<String, VerifyingKey>,
    fetched_at: Option<Instant>,
}

impl KeySet {
    fn empty() -> Self {
        Self { keys: HashMap::new(), fetched_at: None }
    }

    fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|at| at.elapsed())
    }
}

/// Process-wide JWKS client shared by every session.
///
/// Refreshes the cached key set when:
/// - the cache is empty
/// - the TTL has passed
/// - a key-id is requested but not found (key rotation), at most once per
///   minimum refresh interval
///
/// A refresh builds a whole new [`KeySet`] and swaps the `Arc` in, so a
/// validation in flight never sees a half-updated set. Concurrent refreshes
/// are harmless; the last successful fetch wins.
pub struct JwksClient {
    keys: RwLock<Arc<KeySet>>,
    jwks_uri: Url,
    ttl: Duration,
    min_refresh_interval: Duration,
    http: reqwest::Client,
}

impl JwksClient {
    /// Create a client whose fetches are bounded by `timeout`.
    pub fn new(jwks_uri: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            keys: RwLock::new(Arc::new(KeySet::empty())),
            jwks_uri,
            ttl: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(30),
            http,
        })
    }

    /// Set how long a fetched key set stays fresh.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the minimum gap between refreshes triggered by unknown key-ids.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    async fn snapshot(&self) -> Arc<KeySet> {
        self.keys.read().await.clone()
    }

    /// Fetch the key set and replace the cache.
    pub async fn refresh(&self) -> Result<()> {
        tracing::debug!(jwks_uri = %self.jwks_uri, "fetching JWKS");

        let response = self
            .http
            .get(self.jwks_uri.clone())
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchFailed(format!("invalid key set: {e}")))?;

        let keys = jwks.into_verifying_keys();
        let count = keys.len();
        *self.keys.write().await = Arc::new(KeySet { keys, fetched_at: Some(Instant::now()) });

        tracing::debug!(keys = count, "JWKS cache refreshed");
        Ok(())
    }

    /// Number of keys in the current snapshot.
    pub async fn len(&self) -> usize {
        self.snapshot().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyResolver for JwksClient {
    async fn get_key(&self, kid: &str) -> Result<VerifyingKey> {
        let current = self.snapshot().await;
        let age = current.age();
        let expired = age.is_none_or(|age| age >= self.ttl);

        if !expired {
            if let Some(key) = current.keys.get(kid) {
                return Ok(key.clone());
            }
            if age.is_some_and(|age| age < self.min_refresh_interval) {
                tracing::warn!(kid, "unknown key-id on a freshly fetched key set");
                return Err(AuthError::UnknownSigningKey(kid.to_string()));
            }
        }

        self.refresh().await?;

        self.snapshot()
            .await
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownSigningKey(kid.to_string()))
    }
}

/// JWKS response structure.
#[derive(Debug, serde::Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

impl Jwks {
    fn into_verifying_keys(self) -> HashMap<String, VerifyingKey> {
        self.keys
            .into_iter()
            .filter_map(|jwk| {
                let kid = jwk.kid.clone()?;
                match jwk.to_verifying_key() {
                    Ok(key) => Some((kid, key)),
                    Err(e) => {
                        tracing::debug!(kid, error = %e, "skipping unusable JWK");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Individual JWK (JSON Web Key).
#[derive(Debug, serde::Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    #[serde(rename = "use")]
    use_: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl Jwk {
    fn to_verifying_key(&self) -> Result<VerifyingKey> {
        if self.use_.as_deref().is_some_and(|u| u != "sig") {
            return Err(AuthError::JwksFetchFailed("key is not a signing key".into()));
        }
        if self.kty != "RSA" {
            return Err(AuthError::UnsupportedAlgorithm(self.kty.clone()));
        }
        let algorithm = match self.alg.as_deref() {
            Some(alg) => Some(
                alg.parse::<Algorithm>()
                    .map_err(|_| AuthError::UnsupportedAlgorithm(alg.to_string()))?,
            ),
            None => None,
        };
        let n = self
            .n
            .as_ref()
            .ok_or_else(|| AuthError::JwksFetchFailed("missing 'n' in RSA key".into()))?;
        let e = self
            .e
            .as_ref()
            .ok_or_else(|| AuthError::JwksFetchFailed("missing 'e' in RSA key".into()))?;
        let key = DecodingKey::from_rsa_components(n, e)
            .map_err(|e| AuthError::JwksFetchFailed(e.to_string()))?;

        let key = VerifyingKey::new(key);
        Ok(match algorithm {
            Some(alg) => key.with_algorithm(alg),
            None => key,
        })
    }
}
