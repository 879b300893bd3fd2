//! Token revocation.
//!
//! Revoked tokens are recorded by SHA-256 fingerprint, never in clear, with a
//! TTL that should cover the token's remaining lifetime. Entries are
//! append-only: they disappear only when their TTL lapses.
//!
//! Two tiers:
//!
//! - a **shared backend** (Redis in production) that every server instance
//!   consults; it is the authority.
//! - a bounded **in-process fallback** ([`LocalRevocationCache`]) consulted
//!   first and answered from when the shared backend is unreachable.
//!
//! The fallback is NOT consistent across instances: a token revoked through
//! instance A while the shared backend is down is still honored by instance B
//! until the backend recovers. See [`RevocationStore::is_revoked`].

use sha2::{Digest, Sha256};
use thiserror::Error;

mod fallback;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod store;

pub use fallback::LocalRevocationCache;
pub use memory::InMemoryRevocationBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisRevocationBackend;
pub use store::RevocationStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RevocationError {
    #[error("revocation backend error: {0}")]
    Backend(String),

    #[error("revocation backend timed out")]
    Timeout,

    /// Neither the shared backend nor the local fallback could answer.
    #[error("revocation state unavailable")]
    Unavailable,

    #[error("revocation ttl must be at least one second")]
    InvalidTtl,
}

/// Shared key-value store holding revocation entries.
///
/// Implementations must report an unreachable store as an error, never as
/// "not revoked".
pub trait RevocationBackend: Send + Sync + core::fmt::Debug {
    /// Record `key` for `ttl`, never shortening a live entry.
    ///
    /// Returns `true` when no live entry existed, i.e. this call is the one
    /// that revoked the key. The check and the write must be atomic.
    fn put(&self, key: &str, ttl: std::time::Duration) -> Result<bool, RevocationError>;

    /// Whether `key` is currently recorded.
    fn contains(&self, key: &str) -> Result<bool, RevocationError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// One-way fingerprint of a token string (lowercase hex SHA-256).
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// First 12 hex chars of a fingerprint; safe to log.
pub(crate) fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_hex_sha256() {
        let a = token_fingerprint("token-a");
        assert_eq!(a.len(), 64);
        assert_eq!(a, token_fingerprint("token-a"));
        assert_ne!(a, token_fingerprint("token-b"));
        assert!(!a.contains("token"));
        assert_eq!(short(&a).len(), 12);
    }
}
