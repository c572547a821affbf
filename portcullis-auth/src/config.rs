//! Identity provider configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use url::Url;

use crate::error::{AuthError, Result};

pub const ENV_PROVIDER_DOMAIN: &str = "PORTCULLIS_PROVIDER_DOMAIN";
pub const ENV_CLIENT_ID: &str = "PORTCULLIS_CLIENT_ID";
pub const ENV_REDIRECT_URI: &str = "PORTCULLIS_REDIRECT_URI";
pub const ENV_ADMIN_EMAILS: &str = "PORTCULLIS_ADMIN_EMAILS";
pub const ENV_ISSUER: &str = "PORTCULLIS_ISSUER";
pub const ENV_SCOPES: &str = "PORTCULLIS_SCOPES";

const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "email"];

/// Relying-party configuration for one OIDC-compatible identity provider.
///
/// This is a public client: no client secret is held. Endpoint URLs are
/// derived from the provider domain once, at build time.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    domain: Url,
    client_id: String,
    redirect_uri: Url,
    issuer: String,
    scopes: Vec<String>,
    admin_emails: BTreeSet<String>,
    authorize_endpoint: Url,
    signup_endpoint: Url,
    token_endpoint: Url,
    jwks_uri: Url,
    logout_endpoint: Url,
    http_timeout: Duration,
    jwks_ttl: Duration,
    jwks_min_refresh_interval: Duration,
    clock_skew: Duration,
    auth_request_ttl: Duration,
}

impl ProviderConfig {
    /// Create a new builder for constructing a [`ProviderConfig`].
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::default()
    }

    /// Load configuration from `PORTCULLIS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AuthError::Config(format!("{name} must be set")))
        };

        let mut builder = Self::builder()
            .domain(required(ENV_PROVIDER_DOMAIN)?)
            .client_id(required(ENV_CLIENT_ID)?)
            .redirect_uri(required(ENV_REDIRECT_URI)?);

        if let Some(emails) = lookup(ENV_ADMIN_EMAILS) {
            builder = builder.admin_emails(
                emails.split(',').map(str::trim).filter(|e| !e.is_empty()).map(String::from),
            );
        }
        if let Some(issuer) = lookup(ENV_ISSUER).filter(|v| !v.trim().is_empty()) {
            builder = builder.issuer(issuer);
        }
        if let Some(scopes) = lookup(ENV_SCOPES).filter(|v| !v.trim().is_empty()) {
            builder = builder.scopes(scopes.split_whitespace().map(String::from));
        }

        builder.build()
    }

    pub fn domain(&self) -> &Url {
        &self.domain
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Expected `iss` of identity tokens.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn authorize_endpoint(&self) -> &Url {
        &self.authorize_endpoint
    }

    pub fn signup_endpoint(&self) -> &Url {
        &self.signup_endpoint
    }

    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    pub fn logout_endpoint(&self) -> &Url {
        &self.logout_endpoint
    }

    /// Timeout applied to every outbound call to the provider.
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    pub fn jwks_ttl(&self) -> Duration {
        self.jwks_ttl
    }

    pub fn jwks_min_refresh_interval(&self) -> Duration {
        self.jwks_min_refresh_interval
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// How long an outstanding authorization request stays redeemable.
    pub fn auth_request_ttl(&self) -> Duration {
        self.auth_request_ttl
    }

    /// Whether `email` is on the administrator allow-list (case-insensitive).
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.contains(&normalize_email(email))
    }
}

/// Builder for a validated [`ProviderConfig`].
#[derive(Debug, Clone)]
pub struct ProviderConfigBuilder {
    domain: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    issuer: Option<String>,
    scopes: Vec<String>,
    admin_emails: Vec<String>,
    http_timeout: Duration,
    jwks_ttl: Duration,
    jwks_min_refresh_interval: Duration,
    clock_skew: Duration,
    auth_request_ttl: Duration,
}

impl Default for ProviderConfigBuilder {
    fn default() -> Self {
        Self {
            domain: None,
            client_id: None,
            redirect_uri: None,
            issuer: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            admin_emails: Vec::new(),
            http_timeout: Duration::from_secs(10),
            jwks_ttl: Duration::from_secs(3600),
            jwks_min_refresh_interval: Duration::from_secs(30),
            clock_skew: Duration::from_secs(60),
            auth_request_ttl: Duration::from_secs(600),
        }
    }
}

impl ProviderConfigBuilder {
    /// Base URL of the identity provider, e.g. `https://auth.example.com`.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Override the expected issuer (defaults to the domain).
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn admin_emails<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_emails = emails.into_iter().map(Into::into).collect();
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn jwks_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl = ttl;
        self
    }

    pub fn jwks_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.jwks_min_refresh_interval = interval;
        self
    }

    pub fn clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn auth_request_ttl(mut self, ttl: Duration) -> Self {
        self.auth_request_ttl = ttl;
        self
    }

    /// Build the [`ProviderConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if:
    /// - the domain or redirect URI is missing or not an absolute http(s) URL
    /// - the client id is empty
    /// - the scope list is empty
    /// - the HTTP timeout is zero
    pub fn build(self) -> Result<ProviderConfig> {
        let domain = parse_http_url("domain", self.domain)?;
        let redirect_uri = parse_http_url("redirect_uri", self.redirect_uri)?;

        let client_id = self
            .client_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::Config("client_id is required".into()))?;

        if self.scopes.is_empty() {
            return Err(AuthError::Config("at least one scope is required".into()));
        }
        if self.http_timeout.is_zero() {
            return Err(AuthError::Config("http_timeout must be greater than zero".into()));
        }

        let base = domain.as_str().trim_end_matches('/').to_string();
        let endpoint = |path: &str| {
            Url::parse(&format!("{base}{path}"))
                .map_err(|e| AuthError::Config(format!("invalid endpoint {path}: {e}")))
        };

        Ok(ProviderConfig {
            issuer: self.issuer.unwrap_or_else(|| base.clone()),
            authorize_endpoint: endpoint("/oauth2/authorize")?,
            signup_endpoint: endpoint("/signup")?,
            token_endpoint: endpoint("/oauth2/token")?,
            jwks_uri: endpoint("/.well-known/jwks.json")?,
            logout_endpoint: endpoint("/logout")?,
            domain,
            client_id,
            redirect_uri,
            scopes: self.scopes,
            admin_emails: self
                .admin_emails
                .iter()
                .map(|e| normalize_email(e))
                .filter(|e| !e.is_empty())
                .collect(),
            http_timeout: self.http_timeout,
            jwks_ttl: self.jwks_ttl,
            jwks_min_refresh_interval: self.jwks_min_refresh_interval,
            clock_skew: self.clock_skew,
            auth_request_ttl: self.auth_request_ttl,
        })
    }
}

fn parse_http_url(field: &str, value: Option<String>) -> Result<Url> {
    let raw = value.ok_or_else(|| AuthError::Config(format!("{field} is required")))?;
    let url = Url::parse(raw.trim())
        .map_err(|e| AuthError::Config(format!("{field} is not a valid URL: {e}")))?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(AuthError::Config(format!("{field} must use http(s), got '{other}'"))),
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
