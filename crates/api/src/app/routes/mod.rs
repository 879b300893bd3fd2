use axum::{
    Router,
    routing::{get, post},
};

use crate::app::services::AuthServices;

pub mod resources;
pub mod session;
pub mod system;

/// Session endpoints. They authenticate with the refresh token (or nothing,
/// for logout), so they sit outside the principal middleware.
pub fn session_router() -> Router<AuthServices> {
    Router::new()
        .route("/auth/refresh", post(session::refresh))
        .route("/auth/logout", post(session::logout))
}

/// Router for all endpoints that require an authenticated principal.
pub fn router() -> Router<AuthServices> {
    Router::new()
        .route("/auth/me", get(system::me))
        .nest("/resources", resources::router())
}
