use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use warden_auth::Principal;

use crate::error::AuthError;

/// The authenticated principal for a request.
///
/// Present only on routes behind [`crate::middleware::require_principal`];
/// elsewhere extraction fails with `401`.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl CurrentPrincipal {
    pub fn principal(&self) -> &Principal {
        &self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or(AuthError::MissingToken)
    }
}
