use serde::{Deserialize, Serialize};

use warden_core::SubjectId;

use crate::{AccountRecord, Claims, Role};

/// Account lifecycle state as reported by the principal directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account can authenticate and act.
    #[default]
    Active,
    /// Account exists but has not been activated (or was deactivated).
    Inactive,
    /// Account was suspended and cannot authenticate.
    Suspended,
}

impl AccountStatus {
    pub fn is_active(self) -> bool {
        self == AccountStatus::Active
    }
}

impl core::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Inactive => write!(f, "inactive"),
            AccountStatus::Suspended => write!(f, "suspended"),
        }
    }
}

/// Capability interface the access policy needs from an acting party.
///
/// Implemented by [`Principal`]; domain types may implement it too.
pub trait Identity {
    fn subject_id(&self) -> SubjectId;
    fn is_admin(&self) -> bool;
}

/// A verified principal for the duration of one request.
///
/// Built fresh from verified claims plus the directory record on every
/// request; never persisted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject_id: SubjectId,
    pub email: Option<String>,
    pub handle: Option<String>,
    pub roles: Vec<Role>,
    pub status: AccountStatus,
}

impl Principal {
    /// Combine verified token claims with the subject's directory record.
    ///
    /// Directory values win for email/handle since they reflect the current
    /// account, while the token may be up to one lifetime stale.
    pub fn resolve(claims: &Claims, record: &AccountRecord) -> Self {
        Self {
            subject_id: claims.sub.clone(),
            email: record.email.clone().or_else(|| claims.email.clone()),
            handle: record.handle.clone().or_else(|| claims.handle.clone()),
            roles: record.roles.clone(),
            status: record.status,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

impl Identity for Principal {
    fn subject_id(&self) -> SubjectId {
        self.subject_id.clone()
    }

    fn is_admin(&self) -> bool {
        Principal::is_admin(self)
    }
}
