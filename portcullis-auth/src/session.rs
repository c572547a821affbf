//! Session lifecycle: login initiation, callback handling, expiry and logout.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::authorize::{AuthorizationUrlBuilder, build_logout_url};
use crate::claims::Claims;
use crate::config::ProviderConfig;
use crate::error::{AuthError, Result};
use crate::exchange::{TokenExchange, TokenExchangeClient, TokenSet};
use crate::jwks::JwksClient;
use crate::validator::JwtValidator;

/// Where a session is in the authorization-code flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Anonymous,
    PendingAuth,
    Authenticated,
    Expired,
}

/// Which provider page started the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationKind {
    Login,
    Signup,
}

/// The outstanding request of a `PendingAuth` session.
#[derive(Clone)]
pub struct AuthorizationRequest {
    state: String,
    redirect_uri: Url,
    scope: BTreeSet<String>,
    created_at: DateTime<Utc>,
    kind: AuthorizationKind,
}

impl AuthorizationRequest {
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn scope(&self) -> &BTreeSet<String> {
        &self.scope
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn kind(&self) -> AuthorizationKind {
        self.kind
    }

    fn is_stale(&self, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
        (now - self.created_at).to_std().is_ok_and(|age| age > ttl)
    }
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("state", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Per-user session state, owned by that user's request context.
///
/// Fields are only written by [`SessionManager`]; in particular `is_admin` is
/// derived from verified claims and cannot be set from outside.
#[derive(Debug, Default)]
pub struct Session {
    status: SessionStatus,
    pending_auth: Option<AuthorizationRequest>,
    tokens: Option<TokenSet>,
    claims: Option<Claims>,
    is_admin: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn pending_auth(&self) -> Option<&AuthorizationRequest> {
        self.pending_auth.as_ref()
    }

    pub fn tokens(&self) -> Option<&TokenSet> {
        self.tokens.as_ref()
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Read-only view of the verified identity, present only when authenticated.
    ///
    /// Does not check expiry; call [`SessionManager::check_session`] first.
    pub fn identity(&self) -> Option<Identity> {
        if self.status != SessionStatus::Authenticated {
            return None;
        }
        self.claims.as_ref().map(|claims| Identity {
            subject: claims.subject().to_string(),
            email: claims.email().to_string(),
            name: claims.name().map(String::from),
            expires_at: claims.expires_at(),
            is_admin: self.is_admin,
        })
    }

    fn reset(&mut self) {
        *self = Session::default();
    }
}

/// What collaborators may know about the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub is_admin: bool,
}

/// Drives every [`Session`] through its state machine.
///
/// ```text
/// Anonymous --initiate_login--> PendingAuth --handle_callback--> Authenticated
///     ^                              |                                |
///     +---------- failure -----------+            check_session (exp passed)
///     |                                                               v
///     +------------------------ logout ----------------------------Expired
/// ```
pub struct SessionManager {
    config: Arc<ProviderConfig>,
    urls: AuthorizationUrlBuilder,
    exchange: Arc<dyn TokenExchange>,
    validator: Arc<JwtValidator>,
}

impl SessionManager {
    /// Wire up the network-backed token exchange and JWKS validator.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let jwks = JwksClient::new(config.jwks_uri().clone(), config.http_timeout())?
            .with_ttl(config.jwks_ttl())
            .with_min_refresh_interval(config.jwks_min_refresh_interval());
        let validator = JwtValidator::builder()
            .key_resolver(Arc::new(jwks))
            .leeway(config.clock_skew())
            .build()?;
        let exchange = TokenExchangeClient::new(
            config.token_endpoint().clone(),
            config.client_id(),
            config.http_timeout(),
        )?;
        Ok(Self::with_components(config, Arc::new(exchange), Arc::new(validator)))
    }

    /// Assemble from explicit components.
    pub fn with_components(
        config: ProviderConfig,
        exchange: Arc<dyn TokenExchange>,
        validator: Arc<JwtValidator>,
    ) -> Self {
        let urls = AuthorizationUrlBuilder::new(
            config.authorize_endpoint().clone(),
            config.signup_endpoint().clone(),
        );
        Self { config: Arc::new(config), urls, exchange, validator }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Start a login. Any previous session content is discarded.
    pub fn initiate_login(&self, session: &mut Session) -> Url {
        self.initiate(session, AuthorizationKind::Login)
    }

    /// Start a sign-up. Behaves like [`Self::initiate_login`].
    pub fn initiate_signup(&self, session: &mut Session) -> Url {
        self.initiate(session, AuthorizationKind::Signup)
    }

    fn initiate(&self, session: &mut Session, kind: AuthorizationKind) -> Url {
        let config = &self.config;
        let (url, state) = match kind {
            AuthorizationKind::Login => {
                self.urls.build_login_url(config.client_id(), config.redirect_uri(), config.scopes())
            }
            AuthorizationKind::Signup => {
                self.urls.build_signup_url(config.client_id(), config.redirect_uri(), config.scopes())
            }
        };

        session.reset();
        session.pending_auth = Some(AuthorizationRequest {
            state,
            redirect_uri: config.redirect_uri().clone(),
            scope: config.scopes().iter().cloned().collect(),
            created_at: Utc::now(),
            kind,
        });
        session.status = SessionStatus::PendingAuth;

        tracing::info!(kind = ?kind, "authorization request issued");
        url
    }

    /// Complete the flow with the provider's `code` and `state`.
    ///
    /// The outstanding request is consumed before anything else happens, so a
    /// state is redeemable once. On any failure the session ends `Anonymous`.
    /// A callback reaching a session that is not `PendingAuth` is rejected
    /// without touching it.
    pub async fn handle_callback(
        &self,
        session: &mut Session,
        code: &str,
        returned_state: &str,
    ) -> Result<()> {
        if session.status != SessionStatus::PendingAuth {
            tracing::warn!(status = ?session.status, "callback without an outstanding authorization request");
            return Err(AuthError::CsrfStateMismatch);
        }

        let pending = session.pending_auth.take();
        session.reset();
        let Some(pending) = pending else {
            return Err(AuthError::CsrfStateMismatch);
        };

        if pending.is_stale(Utc::now(), self.config.auth_request_ttl()) {
            tracing::warn!("authorization request expired before callback");
            return Err(AuthError::CsrfStateMismatch);
        }

        if !constant_time_eq::constant_time_eq(pending.state.as_bytes(), returned_state.as_bytes()) {
            tracing::warn!("callback state does not match the outstanding request");
            return Err(AuthError::CsrfStateMismatch);
        }

        let tokens = self.exchange.exchange(code, &pending.redirect_uri).await?;

        let claims = self
            .validator
            .validate(&tokens.id_token, self.config.issuer(), self.config.client_id())
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "identity token rejected"))?;

        // Authenticated implies unexpired, whatever the validation leeway
        if claims.is_expired_at(Utc::now()) {
            tracing::warn!("identity token expired within clock-skew leeway");
            return Err(AuthError::TokenExpired);
        }

        let is_admin = self.config.is_admin_email(claims.email());
        tracing::info!(subject = %claims.subject(), is_admin, "session authenticated");

        session.tokens = Some(tokens);
        session.claims = Some(claims);
        session.is_admin = is_admin;
        session.status = SessionStatus::Authenticated;
        Ok(())
    }

    /// Handle a callback carrying `?error=` instead of a code.
    pub fn handle_provider_error(
        &self,
        session: &mut Session,
        error: &str,
        description: Option<&str>,
    ) -> AuthError {
        if session.status == SessionStatus::PendingAuth {
            session.reset();
        }
        tracing::warn!(error, "provider returned an authorization error");
        AuthError::AuthorizationDenied {
            error: error.to_string(),
            description: description.map(String::from),
        }
    }

    /// Expire stale state. Local only; never touches the network.
    pub fn check_session(&self, session: &mut Session) -> SessionStatus {
        self.check_session_at(session, Utc::now())
    }

    /// [`Self::check_session`] as of `now`.
    pub fn check_session_at(&self, session: &mut Session, now: DateTime<Utc>) -> SessionStatus {
        match session.status {
            SessionStatus::Authenticated => {
                let expired = session.claims.as_ref().is_none_or(|c| c.is_expired_at(now));
                if expired {
                    tracing::info!("session expired");
                    session.reset();
                    session.status = SessionStatus::Expired;
                }
            }
            SessionStatus::PendingAuth => {
                let stale = session
                    .pending_auth
                    .as_ref()
                    .is_none_or(|p| p.is_stale(now, self.config.auth_request_ttl()));
                if stale {
                    tracing::debug!("discarding stale authorization request");
                    session.reset();
                }
            }
            SessionStatus::Anonymous | SessionStatus::Expired => {}
        }
        session.status
    }

    /// Gate for protected content.
    pub fn require_authenticated(&self, session: &mut Session) -> Result<Identity> {
        match self.check_session(session) {
            SessionStatus::Authenticated => session.identity().ok_or(AuthError::NotAuthenticated),
            SessionStatus::Expired => Err(AuthError::SessionExpired),
            SessionStatus::Anonymous | SessionStatus::PendingAuth => Err(AuthError::NotAuthenticated),
        }
    }

    /// Clear the session and return the provider logout URL.
    pub fn logout(&self, session: &mut Session) -> Url {
        if let Some(claims) = &session.claims {
            tracing::info!(subject = %claims.subject(), "session logged out");
        }
        session.reset();
        build_logout_url(
            self.config.logout_endpoint(),
            self.config.client_id(),
            self.config.redirect_uri(),
        )
    }
}
