//! Authentication and session errors.

use thiserror::Error;

/// Errors raised while establishing or checking an authenticated session.
///
/// Every variant is recoverable at the session boundary: the session is put
/// back into (or left in) a login-prompt state and the caller shows
/// [`AuthError::user_message`].
#[derive(Debug, Error)]
pub enum AuthError {
    /// The callback's `state` did not match the session's outstanding request,
    /// or no request was outstanding.
    #[error("CSRF state mismatch")]
    CsrfStateMismatch,

    /// The identity provider redirected back with an error parameter.
    #[error("Authorization denied by provider: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    /// The authorization code could not be exchanged for tokens.
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The token header declares an algorithm outside the allow-list.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key-id is absent from the provider's key set even after a fresh fetch.
    #[error("Unknown signing key: kid={0}")]
    UnknownSigningKey(String),

    /// The provider's key set could not be fetched or parsed.
    #[error("JWKS fetch error: {0}")]
    JwksFetchFailed(String),

    /// The token is not a well-formed compact JWS.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// A claim required to build [`crate::Claims`] is missing or out of range.
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    #[error("Invalid issuer: expected '{expected}', got '{actual}'")]
    InvalidIssuer { expected: String, actual: String },

    #[error("Invalid audience: expected '{expected}', got '{actual:?}'")]
    InvalidAudience {
        expected: String,
        actual: Vec<String>,
    },

    /// The identity token's `exp` lies in the past (beyond leeway).
    #[error("Token expired")]
    TokenExpired,

    /// A previously authenticated session outlived its identity token.
    #[error("Session expired")]
    SessionExpired,

    /// Protected content was requested without an authenticated session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::CsrfStateMismatch => "csrf_state_mismatch",
            AuthError::AuthorizationDenied { .. } => "authorization_denied",
            AuthError::TokenExchangeFailed(_) => "token_exchange_failed",
            AuthError::UnsupportedAlgorithm(_)
            | AuthError::UnknownSigningKey(_)
            | AuthError::JwksFetchFailed(_)
            | AuthError::MalformedToken(_)
            | AuthError::InvalidSignature
            | AuthError::MissingClaim(_)
            | AuthError::InvalidIssuer { .. }
            | AuthError::InvalidAudience { .. } => "invalid_token",
            AuthError::TokenExpired | AuthError::SessionExpired => "session_expired",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::Config(_) => "configuration_error",
        }
    }

    /// Message safe to show to the end user.
    ///
    /// Token validation failures share one message regardless of cause.
    pub fn user_message(&self) -> &'static str {
        match self.code() {
            "csrf_state_mismatch" => "Your sign-in request could not be verified. Please sign in again.",
            "authorization_denied" => "Sign-in was cancelled or denied by the identity provider.",
            "token_exchange_failed" => "Sign-in could not be completed. Please try again.",
            "invalid_token" => "Your identity could not be verified. Please sign in again.",
            "session_expired" => "Your session has expired. Please sign in again.",
            "not_authenticated" => "Please sign in to continue.",
            _ => "Authentication is unavailable.",
        }
    }

    /// Whether the caller should prompt the user to log in again.
    pub fn requires_login(&self) -> bool {
        !matches!(self, AuthError::Config(_))
    }
}

/// A convenience result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
