use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::app::services::AuthServices;
use crate::error::AuthError;

/// `POST /auth/refresh`: rotate the refresh cookie and mint a new access cookie.
pub async fn refresh(State(services): State<AuthServices>, headers: HeaderMap) -> Response {
    let sessions = services.sessions.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut out = HeaderMap::new();
        sessions.refresh(&headers, &mut out).map(|()| out)
    })
    .await;

    match result {
        Ok(Ok(out)) => (StatusCode::NO_CONTENT, out).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(join) => AuthError::Internal(join.to_string()).into_response(),
    }
}

/// `POST /auth/logout`: revoke presented tokens and clear session cookies.
///
/// The clearing cookies are sent even when revocation fails.
pub async fn logout(State(services): State<AuthServices>, headers: HeaderMap) -> Response {
    let sessions = services.sessions.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut out = HeaderMap::new();
        let outcome = sessions.terminate(&headers, &mut out);
        (out, outcome)
    })
    .await;

    match result {
        Ok((out, Ok(()))) => (StatusCode::NO_CONTENT, out).into_response(),
        Ok((out, Err(err))) => (out, err).into_response(),
        Err(join) => AuthError::Internal(join.to_string()).into_response(),
    }
}
