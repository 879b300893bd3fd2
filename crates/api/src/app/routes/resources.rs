//! Owned resources guarded by the access policy.
//!
//! A minimal in-memory resource catalogue so the policy is reachable over
//! HTTP. Real applications implement [`Ownable`] on their own types.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use warden_auth::{
    Action, Identity, Ownable, ResourceStatus, can_access, explain_access, require_access,
};
use warden_core::SubjectId;

use crate::app::services::AuthServices;
use crate::context::CurrentPrincipal;
use crate::error::{AuthError, json_error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub id: String,
    pub owner_id: SubjectId,
    pub status: ResourceStatus,
    pub title: String,
}

impl Ownable for Resource {
    fn owner_id(&self) -> SubjectId {
        self.owner_id.clone()
    }

    fn status(&self) -> ResourceStatus {
        self.status.clone()
    }
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    items: RwLock<HashMap<String, Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, resource: Resource) {
        let mut items = self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.insert(resource.id.clone(), resource);
    }

    /// Insert `resource` unless its id is taken. Returns whether it was added.
    pub fn insert_new(&self, resource: Resource) -> bool {
        let mut items = self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        match items.entry(resource.id.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(resource);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Resource> {
        let items = self.items.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Resource> {
        let mut items = self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.remove(id)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateResource {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateResource {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub action: Option<String>,
}

pub fn router() -> Router<AuthServices> {
    Router::new()
        .route("/", axum::routing::post(create))
        .route("/:id", get(read).put(update).delete(remove))
        .route("/:id/access", get(explain))
}

async fn create(
    State(services): State<AuthServices>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<CreateResource>,
) -> Response {
    if body.id.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error");
    }

    let resource = Resource {
        id: body.id,
        owner_id: principal.subject_id(),
        status: body
            .status
            .as_deref()
            .map(ResourceStatus::parse)
            .unwrap_or(ResourceStatus::Private),
        title: body.title,
    };
    if !services.resources.insert_new(resource.clone()) {
        return json_error(StatusCode::CONFLICT, "conflict");
    }
    tracing::info!(resource = %resource.id, owner = %resource.owner_id, "resource created");

    (StatusCode::CREATED, Json(resource)).into_response()
}

async fn read(
    State(services): State<AuthServices>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Resource>, Response> {
    let resource = services.resources.get(&id).ok_or_else(not_found)?;
    require_access(Some(&principal), Some(&resource), Action::Read).map_err(deny)?;
    Ok(Json(resource))
}

async fn update(
    State(services): State<AuthServices>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    Json(body): Json<UpdateResource>,
) -> Result<Json<Resource>, Response> {
    let mut resource = services.resources.get(&id).ok_or_else(not_found)?;
    require_access(Some(&principal), Some(&resource), Action::Write).map_err(deny)?;

    resource.title = body.title;
    services.resources.insert(resource.clone());
    Ok(Json(resource))
}

async fn remove(
    State(services): State<AuthServices>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, Response> {
    let resource = services.resources.get(&id).ok_or_else(not_found)?;
    require_access(Some(&principal), Some(&resource), Action::Delete).map_err(deny)?;

    services.resources.remove(&id);
    tracing::info!(resource = %id, by = %principal.subject_id, "resource deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Audit view of the caller's own decision for `action` (default `read`).
/// Owner and status are withheld unless the caller may read the resource.
async fn explain(
    State(services): State<AuthServices>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    Query(query): Query<ExplainQuery>,
) -> Response {
    let action = match query.action.as_deref().unwrap_or("read") {
        "read" => Action::Read,
        "write" => Action::Write,
        "delete" => Action::Delete,
        _ => return json_error(StatusCode::BAD_REQUEST, "invalid_action"),
    };

    let resource = services.resources.get(&id);
    let mut explanation = explain_access(Some(&principal), resource.as_ref(), action);
    if !can_access(Some(&principal), resource.as_ref(), Action::Read) {
        explanation.owner_id = None;
        explanation.resource_status = None;
    }
    Json(explanation).into_response()
}

fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found")
}

fn deny(err: warden_auth::AccessError) -> Response {
    AuthError::from(err).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: &str, owner: &str) -> Resource {
        Resource {
            id: id.to_string(),
            owner_id: SubjectId::parse(owner).unwrap(),
            status: ResourceStatus::Private,
            title: "t".to_string(),
        }
    }

    #[test]
    fn insert_new_never_replaces_an_existing_owner() {
        let registry = ResourceRegistry::new();
        assert!(registry.insert_new(resource("doc", "alice")));
        assert!(!registry.insert_new(resource("doc", "mallory")));
        assert_eq!(registry.get("doc").unwrap().owner_id.as_str(), "alice");
    }

    #[test]
    fn concurrent_creates_have_one_owner() {
        let registry = std::sync::Arc::new(ResourceRegistry::new());
        let handles: Vec<_> = ["alice", "bob", "carol", "dave"]
            .into_iter()
            .map(|owner| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.insert_new(resource("doc", owner)))
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(created, 1);
    }
}
