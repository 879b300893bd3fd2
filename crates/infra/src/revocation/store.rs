//! Two-tier revocation store.

use std::sync::Arc;
use std::time::Duration;

use warden_core::SharedClock;

use super::{LocalRevocationCache, RevocationBackend, RevocationError, short, token_fingerprint};

/// Records and answers "is this token revoked?".
///
/// Writes go to the local fallback first, then to the shared backend. Reads
/// consult the fallback first and the shared backend on a miss. When the
/// shared backend fails, the fallback's answer is used; when the fallback is
/// also unavailable the store returns [`RevocationError::Unavailable`] and the
/// caller must treat the token as unusable.
#[derive(Debug, Clone)]
pub struct RevocationStore {
    shared: Arc<dyn RevocationBackend>,
    fallback: Arc<LocalRevocationCache>,
    clock: SharedClock,
}

impl RevocationStore {
    pub fn new(
        shared: Arc<dyn RevocationBackend>,
        fallback_capacity: usize,
        clock: SharedClock,
    ) -> Self {
        Self {
            shared,
            fallback: Arc::new(LocalRevocationCache::new(fallback_capacity)),
            clock,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.shared.name()
    }

    /// Record `token` as revoked for `ttl`.
    ///
    /// Returns `true` when this call revoked the token and `false` when the
    /// shared backend already held a live entry for it. Of any number of
    /// concurrent calls for one token, at most one sees `true`.
    ///
    /// A TTL under one second, or one too large to represent, is rejected. A
    /// shared-backend failure is returned to the caller, but the local
    /// fallback still holds the entry so this instance rejects the token
    /// regardless.
    pub fn revoke(&self, token: &str, ttl: Duration) -> Result<bool, RevocationError> {
        if ttl.as_secs() == 0 {
            return Err(RevocationError::InvalidTtl);
        }
        let lifetime = chrono::Duration::from_std(ttl).map_err(|_| RevocationError::InvalidTtl)?;
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(lifetime)
            .ok_or(RevocationError::InvalidTtl)?;

        let key = token_fingerprint(token);

        if let Err(err) = self.fallback.insert(&key, expires_at) {
            tracing::debug!(
                fingerprint = short(&key),
                error = %err,
                "revocation fallback did not record entry"
            );
        }

        let fresh = match self.shared.put(&key, ttl) {
            Ok(fresh) => fresh,
            Err(err) => {
                tracing::warn!(
                    fingerprint = short(&key),
                    backend = self.shared.name(),
                    error = %err,
                    "shared revocation backend write failed"
                );
                return Err(err);
            }
        };

        tracing::info!(
            fingerprint = short(&key),
            ttl_secs = ttl.as_secs(),
            backend = self.shared.name(),
            fresh,
            "token revoked"
        );
        Ok(fresh)
    }

    /// Whether `token` has been revoked.
    ///
    /// While the shared backend is unreachable, a token revoked through a
    /// different instance is reported as not revoked. That window closes when
    /// the backend recovers.
    pub fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        let key = token_fingerprint(token);
        let local = self.fallback.contains(&key, self.clock.now());

        if let Ok(true) = local {
            return Ok(true);
        }

        match self.shared.contains(&key) {
            Ok(revoked) => Ok(revoked),
            Err(err) => match local {
                Ok(revoked) => {
                    tracing::warn!(
                        fingerprint = short(&key),
                        backend = self.shared.name(),
                        error = %err,
                        "shared revocation backend unreachable; answering from local fallback"
                    );
                    Ok(revoked)
                }
                Err(_) => {
                    tracing::error!(
                        fingerprint = short(&key),
                        backend = self.shared.name(),
                        error = %err,
                        "revocation state unavailable"
                    );
                    Err(RevocationError::Unavailable)
                }
            },
        }
    }
}
