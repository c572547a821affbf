//! Identity token claims.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AuthError, Result};

/// Verified claims of an identity token.
///
/// Only [`crate::JwtValidator`] constructs this type, and only after every
/// validation gate has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub(crate) subject: String,
    pub(crate) email: String,
    pub(crate) issuer: String,
    pub(crate) audience: Audience,
    pub(crate) issued_at: Option<DateTime<Utc>>,
    pub(crate) expires_at: DateTime<Utc>,
    pub(crate) name: Option<String>,
}

impl Claims {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Display name, if the provider sent one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether `now` is past the token's expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// The `aud` claim, normalised to a list.
///
/// On the wire it is either one string or an array; an absent claim is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "AudienceClaim")]
pub struct Audience(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum AudienceClaim {
    One(String),
    Many(Vec<String>),
}

impl From<AudienceClaim> for Audience {
    fn from(claim: AudienceClaim) -> Self {
        match claim {
            AudienceClaim::One(client_id) => Audience(vec![client_id]),
            AudienceClaim::Many(client_ids) => Audience(client_ids),
        }
    }
}

impl Audience {
    /// Whether the token was issued for `client_id`.
    pub fn contains(&self, client_id: &str) -> bool {
        self.0.iter().any(|aud| aud == client_id)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Payload as it appears on the wire, before any claim is trusted.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Audience,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl RawClaims {
    /// Convert to typed claims. Called only on a signature-verified payload.
    pub(crate) fn into_claims(self) -> Result<Claims> {
        let exp = self.exp.ok_or_else(|| AuthError::MissingClaim("exp".into()))?;
        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| AuthError::MissingClaim("exp".into()))?;

        Ok(Claims {
            subject: self.sub.ok_or_else(|| AuthError::MissingClaim("sub".into()))?,
            email: self.email.ok_or_else(|| AuthError::MissingClaim("email".into()))?,
            issuer: self.iss.ok_or_else(|| AuthError::MissingClaim("iss".into()))?,
            audience: self.aud,
            issued_at: self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0)),
            expires_at,
            name: self.name,
        })
    }
}

/// Claims read from a token WITHOUT verifying its signature.
///
/// Non-authoritative: for display and debugging only. There is no conversion
/// into [`Claims`], and no session API accepts this type.
#[derive(Debug, Clone)]
pub struct UnverifiedClaims {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub issuer: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub name: Option<String>,
}

/// Decode a token's payload without checking its signature.
///
/// Never use the result for authentication or authorization decisions.
pub fn decode_unverified(token: &str) -> Result<UnverifiedClaims> {
    let raw: RawClaims = decode_segment(token, 1)?;
    Ok(UnverifiedClaims {
        subject: raw.sub,
        email: raw.email,
        issuer: raw.iss,
        expires_at: raw.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
        name: raw.name,
    })
}

/// Decode the JSON segment at `index` of a compact JWS.
pub(crate) fn decode_segment<T: serde::de::DeserializeOwned>(token: &str, index: usize) -> Result<T> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(segments[index])
        .map_err(|e| AuthError::MalformedToken(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedToken(e.to_string()))
}
