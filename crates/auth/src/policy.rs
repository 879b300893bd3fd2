//! Ownership- and role-based access decisions.
//!
//! - No IO
//! - No panics
//! - Depends only on the [`Identity`] and [`Ownable`] capability traits
//!
//! Decision table, first match wins:
//!
//! | condition                              | result |
//! |----------------------------------------|--------|
//! | principal or resource missing          | deny   |
//! | principal is admin                     | allow  |
//! | principal owns the resource            | allow  |
//! | action is read and resource is public  | allow  |
//! | otherwise                              | deny   |

use serde::Serialize;
use thiserror::Error;

use warden_core::SubjectId;

use crate::Identity;

/// Operation being attempted on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility state of a resource as reported by the domain layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Published,
    Draft,
    Archived,
    Private,
    Other(String),
}

impl ResourceStatus {
    /// Map a domain status string. `published` and `public` are the public states.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "published" | "public" => ResourceStatus::Published,
            "draft" => ResourceStatus::Draft,
            "archived" => ResourceStatus::Archived,
            "private" => ResourceStatus::Private,
            other => ResourceStatus::Other(other.to_string()),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, ResourceStatus::Published)
    }
}

/// Capability interface the access policy needs from a resource.
pub trait Ownable {
    fn owner_id(&self) -> SubjectId;

    /// Resources without a visibility notion are treated as private.
    fn status(&self) -> ResourceStatus {
        ResourceStatus::Private
    }
}

/// Plain resource descriptor for callers that do not implement [`Ownable`]
/// on their own types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub owner_id: SubjectId,
    pub status: ResourceStatus,
}

impl ResourceDescriptor {
    pub fn new(owner_id: SubjectId, status: ResourceStatus) -> Self {
        Self { owner_id, status }
    }
}

impl Ownable for ResourceDescriptor {
    fn owner_id(&self) -> SubjectId {
        self.owner_id.clone()
    }

    fn status(&self) -> ResourceStatus {
        self.status.clone()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("insufficient permissions to {action} this resource")]
    InsufficientPermissions { action: Action },

    #[error("resource is not owned by the principal")]
    ResourceOwnership,
}

/// Which row of the decision table decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    MissingPrincipal,
    MissingResource,
    Admin,
    Owner,
    PublicRead,
    NotPermitted,
}

impl DecisionRule {
    pub fn grants(self) -> bool {
        matches!(self, DecisionRule::Admin | DecisionRule::Owner | DecisionRule::PublicRead)
    }
}

fn decide<P, R>(principal: Option<&P>, resource: Option<&R>, action: Action) -> DecisionRule
where
    P: Identity + ?Sized,
    R: Ownable + ?Sized,
{
    let Some(principal) = principal else {
        return DecisionRule::MissingPrincipal;
    };
    let Some(resource) = resource else {
        return DecisionRule::MissingResource;
    };

    if principal.is_admin() {
        return DecisionRule::Admin;
    }
    if principal.subject_id() == resource.owner_id() {
        return DecisionRule::Owner;
    }
    if action == Action::Read && resource.status().is_public() {
        return DecisionRule::PublicRead;
    }
    DecisionRule::NotPermitted
}

/// Boolean access decision, for callers that branch.
pub fn can_access<P, R>(principal: Option<&P>, resource: Option<&R>, action: Action) -> bool
where
    P: Identity + ?Sized,
    R: Ownable + ?Sized,
{
    decide(principal, resource, action).grants()
}

/// Same decision as [`can_access`], failing with an action-scoped error.
pub fn require_access<P, R>(
    principal: Option<&P>,
    resource: Option<&R>,
    action: Action,
) -> Result<(), AccessError>
where
    P: Identity + ?Sized,
    R: Ownable + ?Sized,
{
    let rule = decide(principal, resource, action);
    if rule.grants() {
        Ok(())
    } else {
        tracing::debug!(?rule, %action, "access denied");
        Err(AccessError::InsufficientPermissions { action })
    }
}

/// Same decision as [`can_access`], failing with an ownership-scoped error.
pub fn require_ownership<P, R>(
    principal: Option<&P>,
    resource: Option<&R>,
    action: Action,
) -> Result<(), AccessError>
where
    P: Identity + ?Sized,
    R: Ownable + ?Sized,
{
    let rule = decide(principal, resource, action);
    if rule.grants() {
        Ok(())
    } else {
        tracing::debug!(?rule, %action, "ownership check failed");
        Err(AccessError::ResourceOwnership)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Access Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed, serializable record of one access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessExplanation {
    pub action: Action,
    pub granted: bool,
    pub rule: DecisionRule,
    pub reason: String,
    pub principal_id: Option<SubjectId>,
    pub principal_is_admin: bool,
    pub owner_id: Option<SubjectId>,
    pub resource_status: Option<ResourceStatus>,
}

/// Explain why an access decision was (or would be) made.
pub fn explain_access<P, R>(
    principal: Option<&P>,
    resource: Option<&R>,
    action: Action,
) -> AccessExplanation
where
    P: Identity + ?Sized,
    R: Ownable + ?Sized,
{
    let rule = decide(principal, resource, action);

    let reason = match rule {
        DecisionRule::MissingPrincipal => "No authenticated principal".to_string(),
        DecisionRule::MissingResource => "No resource to evaluate".to_string(),
        DecisionRule::Admin => "Principal holds the admin role".to_string(),
        DecisionRule::Owner => "Principal owns the resource".to_string(),
        DecisionRule::PublicRead => "Resource is public and the action is read".to_string(),
        DecisionRule::NotPermitted => format!(
            "Principal is neither owner nor admin, and '{action}' is not allowed on this resource"
        ),
    };

    AccessExplanation {
        action,
        granted: rule.grants(),
        rule,
        reason,
        principal_id: principal.map(|p| p.subject_id()),
        principal_is_admin: principal.is_some_and(|p| p.is_admin()),
        owner_id: resource.map(|r| r.owner_id()),
        resource_status: resource.map(|r| r.status()),
    }
}
