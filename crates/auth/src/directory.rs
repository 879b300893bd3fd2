//! Principal lookup: the one function the core consumes from the surrounding
//! application's persistence layer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::SubjectId;

use crate::{AccountStatus, Role};

/// What the directory knows about a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub subject_id: SubjectId,
    pub email: Option<String>,
    pub handle: Option<String>,
    pub roles: Vec<Role>,
    pub status: AccountStatus,
}

impl AccountRecord {
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            email: None,
            handle: None,
            roles: Vec::new(),
            status: AccountStatus::Active,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Principal lookup abstraction, implemented by the application's user store.
pub trait PrincipalDirectory: Send + Sync {
    fn lookup(&self, subject: &SubjectId) -> Result<Option<AccountRecord>, DirectoryError>;
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    accounts: RwLock<HashMap<SubjectId, AccountRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, record: AccountRecord) {
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        accounts.insert(record.subject_id.clone(), record);
    }

    pub fn set_status(&self, subject: &SubjectId, status: AccountStatus) -> bool {
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match accounts.get_mut(subject) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }
}

impl PrincipalDirectory for InMemoryDirectory {
    fn lookup(&self, subject: &SubjectId) -> Result<Option<AccountRecord>, DirectoryError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        Ok(accounts.get(subject).cloned())
    }
}
