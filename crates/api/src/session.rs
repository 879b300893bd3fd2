//! Session lifecycle: establish, refresh, terminate.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Duration;

use warden_auth::{AccountRecord, CsrfGuard, IdentityClaims, TokenIssuer, TokenType};
use warden_core::SharedClock;
use warden_infra::RevocationStore;

use crate::error::AuthError;
use crate::gate::Gatekeeper;
use crate::transport::{TokenTransport, TransportError};

/// Issues, rotates and revokes the cookies that make up a browser session.
///
/// All methods write their `Set-Cookie` headers into `out` and block on
/// revocation round trips.
#[derive(Debug, Clone)]
pub struct SessionService {
    issuer: Arc<TokenIssuer>,
    csrf: Arc<CsrfGuard>,
    transport: TokenTransport,
    revocations: RevocationStore,
    gate: Gatekeeper,
    clock: SharedClock,
}

impl SessionService {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        csrf: Arc<CsrfGuard>,
        transport: TokenTransport,
        revocations: RevocationStore,
        gate: Gatekeeper,
        clock: SharedClock,
    ) -> Self {
        Self {
            issuer,
            csrf,
            transport,
            revocations,
            gate,
            clock,
        }
    }

    /// Start a session for an already-authenticated account.
    pub fn establish(&self, out: &mut HeaderMap, record: &AccountRecord) -> Result<(), AuthError> {
        let mut identity = IdentityClaims::new(record.subject_id.as_str());
        if let Some(email) = &record.email {
            identity = identity.with_email(email.clone());
        }
        if let Some(handle) = &record.handle {
            identity = identity.with_handle(handle.clone());
        }

        let pair = self.issuer.issue_pair(&identity)?;
        let names = self.transport.names();
        self.transport.attach(
            out,
            pair.access.as_str(),
            &names.access,
            self.issuer.default_ttl(TokenType::Access),
        )?;
        self.transport.attach(
            out,
            pair.refresh.as_str(),
            &names.refresh,
            self.issuer.default_ttl(TokenType::Refresh),
        )?;
        self.attach_csrf(out, record.subject_id.as_str())?;

        tracing::info!(subject = %record.subject_id, "session established");
        Ok(())
    }

    /// Exchange the presented refresh token for a new access token and a
    /// rotated refresh token. The old refresh token is revoked first.
    ///
    /// Of several concurrent refreshes presenting the same token, only the
    /// one whose revocation lands first succeeds; the rest fail with
    /// [`AuthError::Revoked`] and write no cookies.
    pub fn refresh(&self, incoming: &HeaderMap, out: &mut HeaderMap) -> Result<(), AuthError> {
        let names = self.transport.names();
        let old = self
            .transport
            .extract(incoming, &names.refresh)
            .ok_or(AuthError::MissingToken)?;

        let claims = self.gate.verified(&old, TokenType::Refresh)?;

        let access = self.issuer.refresh(&old)?;
        let refresh = self
            .issuer
            .issue(&claims.identity(), TokenType::Refresh, None)?;

        self.transport
            .rotate(
                out,
                &old,
                refresh.as_str(),
                &names.refresh,
                self.issuer.default_ttl(TokenType::Refresh),
            )
            .map_err(|err| match err {
                TransportError::AlreadyRevoked => {
                    tracing::warn!(subject = %claims.sub, "refresh token replayed during rotation");
                    AuthError::Revoked
                }
                other => AuthError::Transport(other),
            })?;
        self.transport.attach(
            out,
            access.as_str(),
            &names.access,
            self.issuer.default_ttl(TokenType::Access),
        )?;
        self.attach_csrf(out, claims.sub.as_str())?;

        tracing::info!(subject = %claims.sub, "session refreshed");
        Ok(())
    }

    /// End the session: revoke whichever identity tokens are presented and
    /// still valid, then clear every session cookie.
    ///
    /// Cookies are cleared into `out` even when a revocation fails; the
    /// error is returned afterwards.
    pub fn terminate(&self, incoming: &HeaderMap, out: &mut HeaderMap) -> Result<(), AuthError> {
        let names = self.transport.names();
        let mut failure = None;

        let presented = [
            (&names.access, TokenType::Access),
            (&names.refresh, TokenType::Refresh),
        ];
        for (name, token_type) in presented {
            let Some(token) = self.transport.extract(incoming, name) else {
                continue;
            };
            if let Err(err) = self.revoke_if_valid(&token, token_type) {
                failure.get_or_insert(err);
            }
        }

        self.transport.clear(out, &names.access)?;
        self.transport.clear(out, &names.refresh)?;
        self.transport.clear(out, &names.csrf)?;

        match failure {
            Some(err) => Err(err),
            None => {
                tracing::info!("session terminated");
                Ok(())
            }
        }
    }

    fn revoke_if_valid(&self, token: &str, token_type: TokenType) -> Result<(), AuthError> {
        // Expired or forged tokens are already unusable.
        let Ok(claims) = self.issuer.verify(token, Some(token_type)) else {
            return Ok(());
        };
        let remaining = claims.remaining_lifetime(self.clock.now());
        let Ok(ttl) = remaining.max(Duration::seconds(1)).to_std() else {
            return Ok(());
        };
        self.revocations.revoke(token, ttl)?;
        Ok(())
    }

    fn attach_csrf(&self, out: &mut HeaderMap, session_id: &str) -> Result<(), AuthError> {
        let proof = self.csrf.issue(session_id);
        self.transport.attach_csrf(out, &proof.encode(), self.csrf.max_age())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::{HeaderValue, Method};
    use warden_auth::InMemoryDirectory;
    use warden_core::{AuthConfig, ManualClock, SubjectId};
    use warden_infra::{InMemoryRevocationBackend, RevocationBackend, RevocationError};

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn service() -> (SessionService, Gatekeeper, RevocationStore) {
        let clock = ManualClock::starting_now();
        service_with(InMemoryRevocationBackend::arc(clock.clone()), clock)
    }

    fn service_with(
        shared: Arc<dyn RevocationBackend>,
        clock: SharedClock,
    ) -> (SessionService, Gatekeeper, RevocationStore) {
        let config = AuthConfig::builder(SECRET).build().unwrap();
        let issuer = Arc::new(TokenIssuer::new(&config, clock.clone()));
        let csrf = Arc::new(CsrfGuard::new(&config, clock.clone()));
        let revocations = RevocationStore::new(shared, 16, clock.clone());
        let transport = TokenTransport::new(&config, revocations.clone());
        let directory = InMemoryDirectory::arc();
        directory.insert(account());

        let gate = Gatekeeper::new(
            issuer.clone(),
            csrf.clone(),
            transport.clone(),
            revocations.clone(),
            directory,
        );
        let sessions =
            SessionService::new(issuer, csrf, transport, revocations.clone(), gate.clone(), clock);
        (sessions, gate, revocations)
    }

    /// Holds the first `lookups` revocation checks until all of them have
    /// arrived, so concurrent requests pass the check before any revokes.
    #[derive(Debug)]
    struct LockstepBackend {
        inner: InMemoryRevocationBackend,
        barrier: Barrier,
        lookups: usize,
        seen: AtomicUsize,
    }

    impl RevocationBackend for LockstepBackend {
        fn put(&self, key: &str, ttl: std::time::Duration) -> Result<bool, RevocationError> {
            self.inner.put(key, ttl)
        }

        fn contains(&self, key: &str) -> Result<bool, RevocationError> {
            if self.seen.fetch_add(1, Ordering::SeqCst) < self.lookups {
                self.barrier.wait();
            }
            self.inner.contains(key)
        }

        fn name(&self) -> &'static str {
            "lockstep"
        }
    }

    fn account() -> AccountRecord {
        AccountRecord::new(SubjectId::parse("u1").unwrap()).with_handle("alice")
    }

    /// `Set-Cookie` headers turned into a request `Cookie` header.
    fn as_request(out: &HeaderMap) -> HeaderMap {
        let pairs: Vec<&str> = out
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .collect();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&pairs.join("; ")).unwrap());
        headers
    }

    fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
        crate::transport::cookie_value(headers, name).unwrap()
    }

    #[test]
    fn established_session_authenticates() {
        let (sessions, gate, _) = service();
        let mut out = HeaderMap::new();
        sessions.establish(&mut out, &account()).unwrap();
        assert_eq!(out.get_all(SET_COOKIE).iter().count(), 3);

        let principal = gate.authenticate(&Method::GET, &as_request(&out)).unwrap();
        assert_eq!(principal.handle.as_deref(), Some("alice"));
    }

    #[test]
    fn refresh_rotates_and_revokes_old_refresh_token() {
        let (sessions, gate, revocations) = service();
        let mut login = HeaderMap::new();
        sessions.establish(&mut login, &account()).unwrap();
        let incoming = as_request(&login);
        let old_refresh = cookie(&incoming, "refresh_token").to_string();

        let mut out = HeaderMap::new();
        sessions.refresh(&incoming, &mut out).unwrap();

        assert!(revocations.is_revoked(&old_refresh).unwrap());
        let renewed = as_request(&out);
        assert_ne!(cookie(&renewed, "refresh_token"), old_refresh);
        assert!(gate.authenticate(&Method::GET, &renewed).is_ok());

        // Replaying the old refresh token fails.
        let mut again = HeaderMap::new();
        assert!(matches!(sessions.refresh(&incoming, &mut again), Err(AuthError::Revoked)));
        assert!(again.is_empty());
    }

    #[test]
    fn concurrent_refreshes_with_one_token_yield_one_session() {
        let clock = ManualClock::starting_now();
        let backend = Arc::new(LockstepBackend {
            inner: InMemoryRevocationBackend::new(clock.clone()),
            barrier: Barrier::new(2),
            lookups: 2,
            seen: AtomicUsize::new(0),
        });
        let (sessions, _, _) = service_with(backend, clock);

        let mut login = HeaderMap::new();
        sessions.establish(&mut login, &account()).unwrap();
        let incoming = as_request(&login);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let sessions = sessions.clone();
                let incoming = incoming.clone();
                thread::spawn(move || {
                    let mut out = HeaderMap::new();
                    sessions.refresh(&incoming, &mut out).map(|()| out)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let granted: Vec<&HeaderMap> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].get_all(SET_COOKIE).iter().count(), 3);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(AuthError::Revoked)))
        );
    }

    #[test]
    fn access_token_cannot_refresh() {
        let (sessions, _, _) = service();
        let mut login = HeaderMap::new();
        sessions.establish(&mut login, &account()).unwrap();
        let access = cookie(&as_request(&login), "access_token").to_string();

        let mut incoming = HeaderMap::new();
        let cookie = HeaderValue::from_str(&format!("refresh_token={access}")).unwrap();
        incoming.insert(COOKIE, cookie);
        let err = sessions.refresh(&incoming, &mut HeaderMap::new()).unwrap_err();
        assert!(matches!(
            err,
            AuthError::Token(warden_auth::TokenError::InvalidTokenType { .. })
        ));
    }

    #[test]
    fn terminate_revokes_tokens_and_clears_cookies() {
        let (sessions, gate, revocations) = service();
        let mut login = HeaderMap::new();
        sessions.establish(&mut login, &account()).unwrap();
        let incoming = as_request(&login);

        let mut out = HeaderMap::new();
        sessions.terminate(&incoming, &mut out).unwrap();

        assert!(revocations.is_revoked(cookie(&incoming, "access_token")).unwrap());
        assert!(revocations.is_revoked(cookie(&incoming, "refresh_token")).unwrap());
        assert!(matches!(gate.authenticate(&Method::GET, &incoming), Err(AuthError::Revoked)));

        let cleared: Vec<_> = out.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cleared.len(), 3);
        assert!(cleared.iter().all(|c| c.to_str().unwrap().contains("Max-Age=0")));
    }

    #[test]
    fn terminate_without_tokens_still_clears_cookies() {
        let (sessions, _, _) = service();
        let mut out = HeaderMap::new();
        sessions.terminate(&HeaderMap::new(), &mut out).unwrap();
        assert_eq!(out.get_all(SET_COOKIE).iter().count(), 3);
    }
}
