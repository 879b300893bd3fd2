use axum::{Json, http::StatusCode, response::IntoResponse};

use crate::context::CurrentPrincipal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> impl IntoResponse {
    Json(serde_json::json!({
        "subject_id": principal.subject_id.as_str(),
        "email": principal.email,
        "handle": principal.handle,
        "roles": principal.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "is_admin": principal.is_admin(),
    }))
}
