use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use portcullis_auth::{AuthError, AuthorizationKind, Identity, ProviderConfig, Session, SessionManager};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::store::SessionStore;

pub const SESSION_COOKIE: &str = "portcullis_session";

pub const ENV_HOST: &str = "PORTCULLIS_HOST";
pub const ENV_PORT: &str = "PORTCULLIS_PORT";
pub const ENV_SECURE_COOKIES: &str = "PORTCULLIS_SECURE_COOKIES";

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<SessionManager>,
    pub sessions: SessionStore,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(auth: SessionManager, secure_cookies: bool) -> Self {
        Self { auth: Arc::new(auth), sessions: SessionStore::default(), secure_cookies }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080, secure_cookies: true }
    }
}

impl ServerConfig {
    /// Read listener settings, falling back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var(ENV_HOST).unwrap_or(defaults.host),
            port: std::env::var(ENV_PORT)
                .ok()
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            secure_cookies: std::env::var(ENV_SECURE_COOKIES)
                .ok()
                .and_then(|value| value.parse::<bool>().ok())
                .unwrap_or(defaults.secure_cookies),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", get(login))
        .route("/signup", get(signup))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/me", get(me))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig, provider: ProviderConfig) -> anyhow::Result<()> {
    let auth = SessionManager::new(provider).context("failed to initialise session manager")?;
    let app = app_router(AppState::new(auth, config.secure_cookies));
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for portcullis server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("portcullis listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// JSON error body: `{"error": <code>, "message": <user message>}`.
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.requires_login() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = json!({"error": self.0.code(), "message": self.0.user_message()});
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub logout: Option<String>,
}

fn session_cookie(session_id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

async fn current_session(state: &AppState, jar: &CookieJar) -> Option<Arc<Mutex<Session>>> {
    match session_id(jar) {
        Some(id) => state.sessions.get(&id).await,
        None => None,
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status":"ok","service":"portcullis"}))
}

async fn login(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    start_authorization(state, jar, AuthorizationKind::Login).await
}

async fn signup(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    start_authorization(state, jar, AuthorizationKind::Signup).await
}

async fn start_authorization(
    state: AppState,
    jar: CookieJar,
    kind: AuthorizationKind,
) -> (CookieJar, Redirect) {
    // each attempt gets a fresh id, never the one the browser presented
    if let Some(previous) = session_id(&jar) {
        state.sessions.remove(&previous).await;
    }
    let mut session = Session::new();
    let url = match kind {
        AuthorizationKind::Login => state.auth.initiate_login(&mut session),
        AuthorizationKind::Signup => state.auth.initiate_signup(&mut session),
    };
    let id = state.sessions.insert(session, &state.auth).await;
    (jar.add(session_cookie(id, state.secure_cookies)), Redirect::to(url.as_str()))
}

async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    if params.logout.is_some() {
        return Ok(end_session(&state, jar).await.into_response());
    }

    let Some(id) = session_id(&jar) else {
        warn!("callback without a session cookie");
        return Err(AuthError::CsrfStateMismatch.into());
    };
    let Some(session) = state.sessions.get(&id).await else {
        warn!("callback for an unknown session");
        return Err(AuthError::CsrfStateMismatch.into());
    };

    {
        let mut session = session.lock().await;
        if let Some(error) = params.error.as_deref() {
            let err = state.auth.handle_provider_error(&mut session, error, params.error_description.as_deref());
            return Err(err.into());
        }

        let code = params.code.unwrap_or_default();
        let returned_state = params.state.unwrap_or_default();
        state.auth.handle_callback(&mut session, &code, &returned_state).await?;
    }

    // privilege changed, so the pre-login id is retired
    let fresh = state.sessions.rotate(&id).await.ok_or(AuthError::NotAuthenticated)?;
    let jar = jar.add(session_cookie(fresh, state.secure_cookies));
    Ok((jar, Redirect::to("/me")).into_response())
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    end_session(&state, jar).await
}

async fn end_session(state: &AppState, jar: CookieJar) -> (CookieJar, Redirect) {
    let removed = match session_id(&jar) {
        Some(id) => state.sessions.remove(&id).await,
        None => None,
    };
    let url = match removed {
        Some(session) => {
            let mut session = session.lock().await;
            state.auth.logout(&mut session)
        }
        None => state.auth.logout(&mut Session::new()),
    };
    (jar.remove(clear_session_cookie()), Redirect::to(url.as_str()))
}

async fn me(State(state): State<AppState>, jar: CookieJar) -> Result<Json<Identity>, ApiError> {
    let session = current_session(&state, &jar)
        .await
        .ok_or(AuthError::NotAuthenticated)?;
    let mut session = session.lock().await;
    Ok(Json(state.auth.require_authenticated(&mut session)?))
}
