//! `portcullis-server` hosts the login flow of `portcullis-auth` over HTTP.
//! Sessions live in memory and are addressed by an `HttpOnly` cookie.

pub mod server;
pub mod store;

pub use server::{AppState, ServerConfig, app_router, run_server};
pub use store::SessionStore;
