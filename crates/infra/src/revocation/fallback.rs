//! Bounded in-process revocation fallback.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;

use super::RevocationError;

/// In-process revocation set, local to one server instance.
///
/// Capacity-bounded with explicit least-recently-used eviction: when full,
/// inserting evicts the entry that was inserted or looked up longest ago.
/// Entries also lapse once their expiry instant passes.
///
/// A capacity of zero disables the fallback; every call then reports
/// [`RevocationError::Unavailable`].
#[derive(Debug)]
pub struct LocalRevocationCache {
    entries: Option<Mutex<LruCache<String, DateTime<Utc>>>>,
}

impl LocalRevocationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Record `key` until `expires_at`. An existing entry keeps the later of
    /// its current and the new expiry.
    pub fn insert(&self, key: &str, expires_at: DateTime<Utc>) -> Result<(), RevocationError> {
        let entries = self.entries.as_ref().ok_or(RevocationError::Unavailable)?;
        let mut entries = entries.lock().map_err(|_| RevocationError::Unavailable)?;

        if let Some(current) = entries.get_mut(key) {
            *current = (*current).max(expires_at);
            return Ok(());
        }
        if let Some((evicted, _)) = entries.push(key.to_string(), expires_at) {
            tracing::debug!(
                evicted = super::short(&evicted),
                "revocation fallback full; evicted least recently used entry"
            );
        }
        Ok(())
    }

    pub fn contains(&self, key: &str, now: DateTime<Utc>) -> Result<bool, RevocationError> {
        let entries = self.entries.as_ref().ok_or(RevocationError::Unavailable)?;
        let mut entries = entries.lock().map_err(|_| RevocationError::Unavailable)?;

        match entries.get(key).copied() {
            Some(expires_at) if expires_at > now => Ok(true),
            Some(_) => {
                entries.pop(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .as_ref()
            .and_then(|entries| entries.lock().ok().map(|e| e.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
