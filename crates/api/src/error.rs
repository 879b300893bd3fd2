use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use warden_auth::{AccessError, CsrfValidationError, DirectoryError, TokenError};

use crate::transport::TransportError;

/// Every way a request can fail authentication or authorization.
///
/// Variants carry internal detail for logs; responses expose only a coarse
/// category.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no identity token presented")]
    MissingToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("token has been revoked")]
    Revoked,

    #[error("revocation state unavailable")]
    RevocationUnavailable,

    #[error(transparent)]
    Csrf(#[from] CsrfValidationError),

    #[error("token subject is not a known principal")]
    UnknownPrincipal,

    #[error("account is not active")]
    InactiveAccount,

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::Token(_)
            | AuthError::Revoked
            | AuthError::RevocationUnavailable
            | AuthError::UnknownPrincipal => StatusCode::UNAUTHORIZED,
            AuthError::Csrf(_) | AuthError::InactiveAccount | AuthError::Access(_) => {
                StatusCode::FORBIDDEN
            }
            AuthError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Transport(TransportError::Revocation(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Transport(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Coarse category safe to show a client.
    pub fn code(&self) -> &'static str {
        match self.status() {
            StatusCode::UNAUTHORIZED => "invalid_credentials",
            StatusCode::FORBIDDEN if matches!(self, AuthError::Csrf(_)) => "csrf_rejected",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::SERVICE_UNAVAILABLE => "unavailable",
            _ => "internal_error",
        }
    }
}

impl From<warden_infra::RevocationError> for AuthError {
    fn from(err: warden_infra::RevocationError) -> Self {
        AuthError::Transport(TransportError::Revocation(err))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::info!(error = %self, status = status.as_u16(), "request rejected");
        }

        let mut response = json_error(status, self.code());
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

pub fn json_error(status: StatusCode, code: &'static str) -> Response {
    (status, axum::Json(json!({ "error": code }))).into_response()
}
