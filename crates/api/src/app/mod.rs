//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: builds the access-control components from configuration
//! - `routes/`: HTTP routes + handlers

use axum::{Router, routing::get};

use crate::middleware;

pub mod routes;
pub mod services;

pub use services::AuthServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: AuthServices) -> Router {
    // Protected routes: require an authenticated, active principal.
    let protected = routes::router().route_layer(axum::middleware::from_fn_with_state(
        services.clone(),
        middleware::require_principal,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::session_router())
        .merge(protected)
        .with_state(services)
}
