//! In-memory shared backend for single-instance deployments and tests.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use warden_core::SharedClock;

use super::{RevocationBackend, RevocationError};

/// Revocation backend held in process memory.
///
/// Suitable when exactly one server instance runs; offers no sharing.
#[derive(Debug)]
pub struct InMemoryRevocationBackend {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
    clock: SharedClock,
}

impl InMemoryRevocationBackend {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn arc(clock: SharedClock) -> Arc<Self> {
        Arc::new(Self::new(clock))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevocationBackend for InMemoryRevocationBackend {
    fn put(&self, key: &str, ttl: std::time::Duration) -> Result<bool, RevocationError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| RevocationError::InvalidTtl)?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(RevocationError::InvalidTtl)?;

        let mut entries = self
            .entries
            .write()
            .map_err(|_| RevocationError::Backend("lock poisoned".to_string()))?;

        // TTL expiry is lazy; prune on write so the map stays bounded by live entries.
        entries.retain(|_, expires_at| *expires_at > now);

        match entries.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                Ok(true)
            }
            Entry::Occupied(mut occupied) => {
                if *occupied.get() < expires_at {
                    occupied.insert(expires_at);
                }
                Ok(false)
            }
        }
    }

    fn contains(&self, key: &str) -> Result<bool, RevocationError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RevocationError::Backend("lock poisoned".to_string()))?;
        Ok(entries
            .get(key)
            .is_some_and(|expires_at| *expires_at > self.clock.now()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
