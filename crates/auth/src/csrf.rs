//! Session-bound CSRF proofs.
//!
//! A proof is `timestamp.hexdigest` where the digest is HMAC-SHA256, keyed with
//! the signing secret, over the session id and the timestamp. The proof travels
//! in a script-readable cookie and must be echoed back in a request header.

use chrono::Duration;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use warden_core::{AuthConfig, SharedClock};

type HmacSha256 = Hmac<Sha256>;

/// Separator between timestamp and digest in the encoded proof.
pub const CSRF_SEPARATOR: char = '.';

/// How far in the future a proof timestamp may lie (clock skew between instances).
const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// CSRF rejection. Deliberately carries no detail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("csrf validation failed")]
pub struct CsrfValidationError;

/// An issued CSRF proof.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken {
    pub timestamp: i64,
    pub session_id: String,
    digest: String,
}

impl CsrfToken {
    /// Encoded `timestamp.digest` form sent to the client.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.timestamp, CSRF_SEPARATOR, self.digest)
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl core::fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CsrfToken")
            .field("timestamp", &self.timestamp)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Issues and verifies CSRF proofs.
pub struct CsrfGuard {
    keyed: HmacSha256,
    max_age: Duration,
    clock: SharedClock,
}

impl core::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl CsrfGuard {
    pub fn new(config: &AuthConfig, clock: SharedClock) -> Self {
        let keyed = HmacSha256::new_from_slice(config.secret.as_bytes())
            .expect("HMAC can take key of any size");
        Self {
            keyed,
            max_age: config.csrf_max_age,
            clock,
        }
    }

    /// Configured maximum proof age.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn mac(&self, session_id: &str, timestamp: i64) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(session_id.as_bytes());
        mac.update(b"|");
        mac.update(timestamp.to_string().as_bytes());
        mac
    }

    pub fn issue(&self, session_id: &str) -> CsrfToken {
        let timestamp = self.clock.now().timestamp();
        let digest = hex::encode(self.mac(session_id, timestamp).finalize().into_bytes());
        CsrfToken {
            timestamp,
            session_id: session_id.to_string(),
            digest,
        }
    }

    /// Check `token` against `session_id`. Never errors: any malformed,
    /// mismatched or aged proof is simply `false`.
    pub fn verify(&self, token: &str, session_id: &str, max_age: Duration) -> bool {
        if session_id.is_empty() {
            return false;
        }

        let Some((timestamp, digest)) = token.trim().split_once(CSRF_SEPARATOR) else {
            return false;
        };
        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let Ok(timestamp) = timestamp.parse::<i64>() else {
            return false;
        };
        let Ok(digest) = hex::decode(digest) else {
            return false;
        };

        // Constant-time comparison.
        if self.mac(session_id, timestamp).verify_slice(&digest).is_err() {
            return false;
        }

        let age = self.clock.now().timestamp() - timestamp;
        age <= max_age.num_seconds() && age >= -MAX_CLOCK_SKEW_SECS
    }

    /// [`verify`](Self::verify) as a typed result.
    pub fn require(
        &self,
        token: &str,
        session_id: &str,
        max_age: Duration,
    ) -> Result<(), CsrfValidationError> {
        if self.verify(token, session_id, max_age) {
            Ok(())
        } else {
            tracing::debug!("csrf proof rejected");
            Err(CsrfValidationError)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use warden_core::ManualClock;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn guard() -> (CsrfGuard, Arc<ManualClock>) {
        let config = AuthConfig::builder(SECRET).build().unwrap();
        let clock = ManualClock::starting_now();
        (CsrfGuard::new(&config, clock.clone()), clock)
    }

    #[test]
    fn fresh_proof_verifies_for_its_session() {
        let (guard, _) = guard();
        let token = guard.issue("session-1");
        assert!(guard.verify(&token.encode(), "session-1", Duration::hours(1)));
        assert!(guard.require(&token.encode(), "session-1", Duration::hours(1)).is_ok());
    }

    #[test]
    fn proof_is_bound_to_session() {
        let (guard, _) = guard();
        let token = guard.issue("session-1");
        assert!(!guard.verify(&token.encode(), "session-2", Duration::hours(1)));
        assert_eq!(
            guard.require(&token.encode(), "session-2", Duration::hours(1)),
            Err(CsrfValidationError)
        );
    }

    #[test]
    fn proof_expires_after_max_age() {
        let (guard, clock) = guard();
        let token = guard.issue("session-1").encode();

        clock.advance(Duration::seconds(60));
        assert!(guard.verify(&token, "session-1", Duration::seconds(60)));

        clock.advance(Duration::seconds(1));
        assert!(!guard.verify(&token, "session-1", Duration::seconds(60)));
    }

    #[test]
    fn proof_from_other_secret_is_rejected() {
        let (guard, clock) = guard();
        let other_config = AuthConfig::builder("ffffffffffffffffffffffffffffffff").build().unwrap();
        let other = CsrfGuard::new(&other_config, clock);
        let token = other.issue("session-1").encode();
        assert!(!guard.verify(&token, "session-1", Duration::hours(1)));
    }

    #[test]
    fn future_timestamps_beyond_skew_are_rejected() {
        let (guard, clock) = guard();
        clock.advance(Duration::minutes(5));
        let token = guard.issue("session-1").encode();
        clock.advance(Duration::minutes(-5));
        assert!(!guard.verify(&token, "session-1", Duration::hours(1)));
    }

    #[test]
    fn malformed_input_fails_closed() {
        let (guard, _) = guard();
        let valid = guard.issue("session-1").encode();
        let (ts, digest) = valid.split_once('.').unwrap();

        for input in [
            String::new(),
            ".".to_string(),
            "no-separator".to_string(),
            format!("{ts}."),
            format!(".{digest}"),
            format!("-{ts}.{digest}"),
            format!("+{ts}.{digest}"),
            format!("{ts}.{}", &digest[..10]),
            format!("{ts}.zz{}", &digest[2..]),
            format!("{ts}x.{digest}"),
            format!("{ts}.{digest}.extra"),
        ] {
            assert!(!guard.verify(&input, "session-1", Duration::hours(1)), "accepted {input:?}");
        }

        assert!(!guard.verify(&valid, "", Duration::hours(1)));
    }

    #[test]
    fn encoded_form_is_timestamp_dot_hex_digest() {
        let (guard, clock) = guard();
        let token = guard.issue("session-1");
        let encoded = token.encode();

        assert_eq!(token.timestamp, clock_now(&clock));
        assert_eq!(encoded, format!("{}.{}", token.timestamp, token.digest()));
        assert_eq!(token.digest().len(), 64);
        assert!(!format!("{token:?}").contains(token.digest()));
    }

    fn clock_now(clock: &ManualClock) -> i64 {
        use warden_core::Clock;
        clock.now().timestamp()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        #[test]
        fn proofs_only_verify_for_the_issuing_session(
            session in "[a-zA-Z0-9]{1,32}",
            other in "[a-zA-Z0-9]{1,32}",
        ) {
            let (guard, _) = guard();
            let token = guard.issue(&session).encode();
            prop_assert!(guard.verify(&token, &session, Duration::hours(1)));
            if other != session {
                prop_assert!(!guard.verify(&token, &other, Duration::hours(1)));
            }
        }
    }
}
