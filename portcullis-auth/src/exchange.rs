//! Authorization-code to token exchange.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::{AuthError, Result};

/// Tokens returned by the provider's token endpoint.
///
/// Never logged: the `Debug` implementation redacts every token.
#[derive(Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[redacted]")
            .field("id_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Exchanges an authorization code for a [`TokenSet`].
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Redeem `code`. Implementations must not retry: codes are single-use.
    async fn exchange(&self, code: &str, redirect_uri: &Url) -> Result<TokenSet>;
}

/// [`TokenExchange`] against the provider's `/oauth2/token` endpoint.
pub struct TokenExchangeClient {
    token_endpoint: Url,
    client_id: String,
    http: reqwest::Client,
}

impl TokenExchangeClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(token_endpoint: Url, client_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(token_endpoint, client_id, http))
    }

    /// Use a preconfigured HTTP client (connection pool reuse or testing).
    pub fn with_http_client(
        token_endpoint: Url,
        client_id: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self { token_endpoint, client_id: client_id.into(), http }
    }
}

#[async_trait]
impl TokenExchange for TokenExchangeClient {
    async fn exchange(&self, code: &str, redirect_uri: &Url) -> Result<TokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(self.token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "timed out" } else { "request failed" };
                tracing::warn!(endpoint = %self.token_endpoint, reason, "token exchange transport error");
                AuthError::TokenExchangeFailed(reason.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "token endpoint rejected authorization code");
            return Err(AuthError::TokenExchangeFailed(format!("token endpoint returned {status}")));
        }

        let tokens = response.json::<TokenSet>().await.map_err(|e| {
            tracing::warn!(error = %e, "malformed token endpoint response");
            AuthError::TokenExchangeFailed("malformed token response".to_string())
        })?;

        tracing::debug!(token_type = %tokens.token_type, expires_in = tokens.expires_in, "authorization code redeemed");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = TokenSet {
            access_token: "secret-access".into(),
            id_token: "secret-id".into(),
            refresh_token: Some("secret-refresh".into()),
            token_type: "Bearer".into(),
            expires_in: 3600,
        };
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[redacted]"));
        assert!(rendered.contains("3600"));
    }

    #[test]
    fn test_token_set_defaults() {
        let tokens: TokenSet =
            serde_json::from_str(r#"{"access_token":"a","id_token":"i"}"#).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 0);
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn test_missing_id_token_is_rejected() {
        assert!(serde_json::from_str::<TokenSet>(r#"{"access_token":"a"}"#).is_err());
    }
}
