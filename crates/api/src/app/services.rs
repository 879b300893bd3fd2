//! Wiring of the access-control components into one shareable bundle.

use std::sync::Arc;

use warden_auth::{CsrfGuard, PrincipalDirectory, TokenIssuer};
use warden_core::{AuthConfig, SharedClock};
use warden_infra::{InMemoryRevocationBackend, RevocationBackend, RevocationStore};

use crate::app::routes::resources::ResourceRegistry;
use crate::gate::Gatekeeper;
use crate::session::SessionService;
use crate::transport::TokenTransport;

/// Everything request handlers need, cheap to clone.
#[derive(Debug, Clone)]
pub struct AuthServices {
    pub config: Arc<AuthConfig>,
    pub issuer: Arc<TokenIssuer>,
    pub gate: Gatekeeper,
    pub sessions: SessionService,
    pub revocations: RevocationStore,
    pub resources: Arc<ResourceRegistry>,
}

impl AuthServices {
    pub fn build(
        config: AuthConfig,
        clock: SharedClock,
        shared: Arc<dyn RevocationBackend>,
        directory: Arc<dyn PrincipalDirectory>,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::new(&config, clock.clone()));
        let csrf = Arc::new(CsrfGuard::new(&config, clock.clone()));
        let capacity = config.revocation.fallback_capacity;
        let revocations = RevocationStore::new(shared, capacity, clock.clone());
        let transport = TokenTransport::new(&config, revocations.clone());

        let gate = Gatekeeper::new(
            issuer.clone(),
            csrf.clone(),
            transport.clone(),
            revocations.clone(),
            directory,
        );
        let sessions = SessionService::new(
            issuer.clone(),
            csrf,
            transport,
            revocations.clone(),
            gate.clone(),
            clock,
        );

        Self {
            config: Arc::new(config),
            issuer,
            gate,
            sessions,
            revocations,
            resources: Arc::new(ResourceRegistry::new()),
        }
    }
}

/// Pick the shared revocation backend from configuration.
///
/// Redis when a URL is configured and the `redis` feature is built in;
/// otherwise an in-process store, which is only correct for a single
/// instance.
pub fn revocation_backend(
    config: &AuthConfig,
    clock: SharedClock,
) -> anyhow::Result<Arc<dyn RevocationBackend>> {
    match &config.revocation.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let timeout = config.revocation.timeout;
            let backend = warden_infra::RedisRevocationBackend::new(url, timeout)?;
            tracing::info!(
                timeout_ms = timeout.as_millis() as u64,
                "using redis revocation backend"
            );
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!(
                "WARDEN_REDIS_URL set but built without the `redis` feature; \
                 revocations stay in process"
            );
            Ok(InMemoryRevocationBackend::arc(clock))
        }
        None => {
            tracing::warn!("no shared revocation store configured; revocations stay in process");
            Ok(InMemoryRevocationBackend::arc(clock))
        }
    }
}
