use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::app::services::AuthServices;
use crate::error::AuthError;

/// Authenticate the request and make the [`warden_auth::Principal`]
/// available to handlers through request extensions.
pub async fn require_principal(
    State(services): State<AuthServices>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let method = req.method().clone();
    let headers = req.headers().clone();
    let gate = services.gate.clone();

    // Revocation and directory lookups may block on network round trips.
    let principal = tokio::task::spawn_blocking(move || gate.authenticate(&method, &headers))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))??;

    tracing::debug!(subject = %principal.subject_id, "request authenticated");
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}
