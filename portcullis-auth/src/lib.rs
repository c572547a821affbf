//! OAuth2 authorization-code login for portcullis.
//!
//! This crate drives a user's session through an external identity provider:
//! CSRF-protected authorization requests, code-for-token exchange, identity
//! token verification against the provider's published keys, and session
//! expiry.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use portcullis_auth::{ProviderConfig, Session, SessionManager};
//!
//! let manager = SessionManager::new(ProviderConfig::from_env()?)?;
//! let mut session = Session::new();
//!
//! // redirect the browser here
//! let login_url = manager.initiate_login(&mut session);
//!
//! // on GET /callback?code=..&state=..
//! manager.handle_callback(&mut session, &code, &state).await?;
//!
//! let identity = manager.require_authenticated(&mut session)?;
//! println!("User: {} admin={}", identity.email, identity.is_admin);
//! ```

mod authorize;
mod claims;
mod config;
mod error;
mod exchange;
mod jwks;
mod session;
mod state;
mod validator;

pub use authorize::{AuthorizationUrlBuilder, build_logout_url};
pub use claims::{Audience, Claims, UnverifiedClaims, decode_unverified};
pub use config::{
    ENV_ADMIN_EMAILS, ENV_CLIENT_ID, ENV_ISSUER, ENV_PROVIDER_DOMAIN, ENV_REDIRECT_URI, ENV_SCOPES,
    ProviderConfig, ProviderConfigBuilder,
};
pub use error::{AuthError, Result};
pub use exchange::{TokenExchange, TokenExchangeClient, TokenSet};
pub use jwks::{JwksClient, KeyResolver, VerifyingKey};
pub use session::{
    AuthorizationKind, AuthorizationRequest, Identity, Session, SessionManager, SessionStatus,
};
pub use state::StateTokenGenerator;
pub use validator::{JwtValidator, JwtValidatorBuilder};
