//! Per-request authentication pipeline.

use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use chrono::Duration;

use warden_auth::{Claims, CsrfGuard, Principal, PrincipalDirectory, TokenIssuer, TokenType};
use warden_infra::RevocationStore;

use crate::error::AuthError;
use crate::transport::{TokenSource, TokenTransport, cookie_value};

/// Header a browser client echoes the CSRF cookie back in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Turns request headers into a verified, active [`Principal`].
///
/// Checks run in a fixed order and stop at the first failure:
/// token format/signature, expiry, type, revocation, CSRF (mutating requests
/// authenticated by cookie only), then account lookup and status.
/// Authorization of a specific resource is left to the handler.
#[derive(Clone)]
pub struct Gatekeeper {
    issuer: Arc<TokenIssuer>,
    csrf: Arc<CsrfGuard>,
    transport: TokenTransport,
    revocations: RevocationStore,
    directory: Arc<dyn PrincipalDirectory>,
}

impl core::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("issuer", &self.issuer)
            .field("revocations", &self.revocations.backend_name())
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        csrf: Arc<CsrfGuard>,
        transport: TokenTransport,
        revocations: RevocationStore,
        directory: Arc<dyn PrincipalDirectory>,
    ) -> Self {
        Self {
            issuer,
            csrf,
            transport,
            revocations,
            directory,
        }
    }

    /// Authenticate a request. Blocks on the revocation and directory
    /// lookups; call from a blocking context.
    pub fn authenticate(
        &self,
        method: &Method,
        headers: &HeaderMap,
    ) -> Result<Principal, AuthError> {
        let (token, source) = self
            .transport
            .extract_with_source(headers, &self.transport.names().access)
            .ok_or(AuthError::MissingToken)?;

        let claims = self.verified(&token, TokenType::Access)?;

        if !method.is_safe() && source == TokenSource::Cookie {
            self.check_csrf(headers, &claims)?;
        }

        let record = self
            .directory
            .lookup(&claims.sub)?
            .ok_or(AuthError::UnknownPrincipal)?;

        let principal = Principal::resolve(&claims, &record);
        if !principal.is_active() {
            tracing::info!(
                subject = %principal.subject_id,
                status = %principal.status,
                "inactive account rejected"
            );
            return Err(AuthError::InactiveAccount);
        }

        Ok(principal)
    }

    /// Verify `token` as `expected` and check it has not been revoked.
    pub fn verified(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let claims = self.issuer.verify(token, Some(expected))?;

        match self.revocations.is_revoked(token) {
            Ok(false) => Ok(claims),
            Ok(true) => Err(AuthError::Revoked),
            Err(_) => Err(AuthError::RevocationUnavailable),
        }
    }

    fn check_csrf(&self, headers: &HeaderMap, claims: &Claims) -> Result<(), AuthError> {
        let presented = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if let Some(cookie) = cookie_value(headers, &self.transport.names().csrf) {
            if cookie != presented {
                return Err(warden_auth::CsrfValidationError.into());
            }
        }

        self.csrf
            .require(presented, claims.sub.as_str(), self.csrf_max_age())
            .map_err(AuthError::from)
    }

    fn csrf_max_age(&self) -> Duration {
        self.csrf.max_age()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum::http::header::{AUTHORIZATION, COOKIE};
    use warden_auth::{AccountRecord, AccountStatus, IdentityClaims, InMemoryDirectory};
    use warden_core::{AuthConfig, ManualClock, SubjectId};
    use warden_infra::InMemoryRevocationBackend;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct Fixture {
        gate: Gatekeeper,
        issuer: Arc<TokenIssuer>,
        csrf: Arc<CsrfGuard>,
        revocations: RevocationStore,
        directory: Arc<InMemoryDirectory>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let config = AuthConfig::builder(SECRET).build().unwrap();
        let clock = ManualClock::starting_now();
        let issuer = Arc::new(TokenIssuer::new(&config, clock.clone()));
        let csrf = Arc::new(CsrfGuard::new(&config, clock.clone()));
        let backend = InMemoryRevocationBackend::arc(clock.clone());
        let revocations = RevocationStore::new(backend, 16, clock.clone());
        let directory = InMemoryDirectory::arc();
        let u1 = SubjectId::parse("u1").unwrap();
        directory.insert(AccountRecord::new(u1).with_email("u1@example.com"));

        let gate = Gatekeeper::new(
            issuer.clone(),
            csrf.clone(),
            TokenTransport::new(&config, revocations.clone()),
            revocations.clone(),
            directory.clone(),
        );
        Fixture {
            gate,
            issuer,
            csrf,
            revocations,
            directory,
            clock,
        }
    }

    fn access_token(f: &Fixture) -> String {
        f.issuer
            .issue(&IdentityClaims::new("u1"), TokenType::Access, None)
            .unwrap()
            .into_string()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers
    }

    fn cookies(pairs: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pairs).unwrap());
        headers
    }

    #[test]
    fn valid_bearer_token_authenticates() {
        let f = fixture();
        let principal = f.gate.authenticate(&Method::GET, &bearer(&access_token(&f))).unwrap();
        assert_eq!(principal.subject_id.as_str(), "u1");
        assert_eq!(principal.email.as_deref(), Some("u1@example.com"));
    }

    #[test]
    fn missing_token_is_rejected() {
        let f = fixture();
        let err = f.gate.authenticate(&Method::GET, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }

    #[test]
    fn refresh_token_cannot_authenticate_requests() {
        let f = fixture();
        let refresh = f
            .issuer
            .issue(&IdentityClaims::new("u1"), TokenType::Refresh, None)
            .unwrap();
        let err = f.gate.authenticate(&Method::GET, &bearer(refresh.as_str())).unwrap_err();
        assert!(matches!(err, AuthError::Token(warden_auth::TokenError::InvalidTokenType { .. })));
    }

    #[test]
    fn expired_token_is_rejected_before_revocation_lookup() {
        let f = fixture();
        let token = access_token(&f);
        f.clock.advance(Duration::hours(1));
        let err = f.gate.authenticate(&Method::GET, &bearer(&token)).unwrap_err();
        assert!(matches!(err, AuthError::Token(warden_auth::TokenError::ExpiredToken)));
    }

    #[test]
    fn revoked_token_is_rejected() {
        let f = fixture();
        let token = access_token(&f);
        f.revocations.revoke(&token, std::time::Duration::from_secs(60)).unwrap();
        let err = f.gate.authenticate(&Method::GET, &bearer(&token)).unwrap_err();
        assert!(matches!(err, AuthError::Revoked));
    }

    #[test]
    fn inactive_and_unknown_accounts_are_rejected() {
        let f = fixture();
        let token = access_token(&f);

        f.directory
            .set_status(&SubjectId::parse("u1").unwrap(), AccountStatus::Suspended);
        let err = f.gate.authenticate(&Method::GET, &bearer(&token)).unwrap_err();
        assert!(matches!(err, AuthError::InactiveAccount));

        let stranger = f
            .issuer
            .issue(&IdentityClaims::new("u2"), TokenType::Access, None)
            .unwrap();
        let err = f.gate.authenticate(&Method::GET, &bearer(stranger.as_str())).unwrap_err();
        assert!(matches!(err, AuthError::UnknownPrincipal));
    }

    #[test]
    fn cookie_authenticated_mutation_requires_csrf() {
        let f = fixture();
        let token = access_token(&f);
        let proof = f.csrf.issue("u1").encode();

        let mut headers = cookies(&format!("access_token={token}; csrf_token={proof}"));
        assert!(f.gate.authenticate(&Method::GET, &headers).is_ok());

        let err = f.gate.authenticate(&Method::POST, &headers).unwrap_err();
        assert!(matches!(err, AuthError::Csrf(_)));

        headers.insert(CSRF_HEADER, HeaderValue::from_str(&proof).unwrap());
        assert!(f.gate.authenticate(&Method::POST, &headers).is_ok());
    }

    #[test]
    fn csrf_header_must_match_cookie_and_session() {
        let f = fixture();
        let token = access_token(&f);
        let proof = f.csrf.issue("u1").encode();
        let other = f.csrf.issue("someone-else").encode();

        let mut headers = cookies(&format!("access_token={token}; csrf_token={proof}"));
        headers.insert(CSRF_HEADER, HeaderValue::from_str(&other).unwrap());
        assert!(matches!(
            f.gate.authenticate(&Method::DELETE, &headers),
            Err(AuthError::Csrf(_))
        ));

        let mut headers = cookies(&format!("access_token={token}"));
        headers.insert(CSRF_HEADER, HeaderValue::from_str(&other).unwrap());
        assert!(matches!(
            f.gate.authenticate(&Method::DELETE, &headers),
            Err(AuthError::Csrf(_))
        ));
    }

    #[test]
    fn bearer_clients_are_exempt_from_csrf() {
        let f = fixture();
        assert!(f.gate.authenticate(&Method::POST, &bearer(&access_token(&f))).is_ok());
    }
}
