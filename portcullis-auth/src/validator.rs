//! JWT validation against the provider's published keys.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use serde::Deserialize;

use crate::claims::{Claims, RawClaims, decode_segment};
use crate::error::{AuthError, Result};
use crate::jwks::{KeyResolver, VerifyingKey};

#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Verifies identity tokens before any claim is trusted.
///
/// Gates, in order, each aborting on failure:
/// 1. header algorithm is on the asymmetric allow-list
/// 2. the key-id resolves to a provider key
/// 3. the signature verifies under that key
/// 4. `iss` equals the expected issuer
/// 5. `aud` contains the expected audience
/// 6. `exp` has not passed (within leeway)
pub struct JwtValidator {
    keys: Arc<dyn KeyResolver>,
    algorithms: Vec<Algorithm>,
    leeway: Duration,
}

impl JwtValidator {
    /// Create a new builder.
    pub fn builder() -> JwtValidatorBuilder {
        JwtValidatorBuilder::default()
    }

    /// Validate `token` at the current time.
    pub async fn validate(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: &str,
    ) -> Result<Claims> {
        self.validate_at(token, expected_issuer, expected_audience, Utc::now()).await
    }

    /// Validate `token` as of `now`.
    pub async fn validate_at(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims> {
        let header: RawHeader = decode_segment(token, 0).map_err(|e| {
            tracing::warn!(error = %e, "unparseable token header");
            AuthError::InvalidSignature
        })?;
        let alg = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| self.algorithms.contains(alg))
            .ok_or_else(|| {
                tracing::warn!(alg = %header.alg, "rejected token algorithm");
                AuthError::UnsupportedAlgorithm(header.alg.clone())
            })?;

        let kid = header.kid.ok_or(AuthError::InvalidSignature)?;
        let key = self.keys.get_key(&kid).await.map_err(|e| {
            tracing::warn!(kid = %kid, error = %e, "signing key unavailable");
            AuthError::InvalidSignature
        })?;
        if !key.permits(alg) {
            tracing::warn!(kid = %kid, alg = ?alg, pinned = ?key.algorithm(), "key published for another algorithm");
            return Err(AuthError::InvalidSignature);
        }

        let mut validation = jsonwebtoken::Validation::new(alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let raw = jsonwebtoken::decode::<RawClaims>(token, key.key(), &validation)
            .map_err(|e| {
                tracing::warn!(kid = %kid, error = %e, "token signature rejected");
                AuthError::InvalidSignature
            })?
            .claims;
        let claims = raw.into_claims()?;

        if claims.issuer != expected_issuer {
            return Err(AuthError::InvalidIssuer {
                expected: expected_issuer.to_string(),
                actual: claims.issuer,
            });
        }

        if !claims.audience.contains(expected_audience) {
            return Err(AuthError::InvalidAudience {
                expected: expected_audience.to_string(),
                actual: claims.audience.values().to_vec(),
            });
        }

        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        if now.timestamp() >= claims.expires_at.timestamp().saturating_add(leeway) {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}

/// Builder for [`JwtValidator`].
#[derive(Default)]
pub struct JwtValidatorBuilder {
    keys: Option<Arc<dyn KeyResolver>>,
    algorithms: Vec<Algorithm>,
    leeway: Option<Duration>,
}

impl JwtValidatorBuilder {
    /// Set the source of provider signing keys.
    pub fn key_resolver(mut self, keys: Arc<dyn KeyResolver>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Add an allowed algorithm. Defaults to RS256 alone.
    pub fn algorithm(mut self, alg: Algorithm) -> Self {
        self.algorithms.push(alg);
        self
    }

    /// Clock-skew tolerance applied to `exp` (default 60s).
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = Some(leeway);
        self
    }

    /// Build the validator.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if no key resolver is set or a symmetric
    /// algorithm is allowed.
    pub fn build(self) -> Result<JwtValidator> {
        let keys = self
            .keys
            .ok_or_else(|| AuthError::Config("key resolver is required".into()))?;

        if let Some(alg) = self
            .algorithms
            .iter()
            .find(|alg| matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
        {
            return Err(AuthError::Config(format!("symmetric algorithm {alg:?} cannot be allowed")));
        }

        let algorithms =
            if self.algorithms.is_empty() { vec![Algorithm::RS256] } else { self.algorithms };

        Ok(JwtValidator {
            keys,
            algorithms,
            leeway: self.leeway.unwrap_or(Duration::from_secs(60)),
        })
    }
}
