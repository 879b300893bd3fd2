use std::sync::Arc;

use anyhow::Context;

use warden_api::AuthServices;
use warden_api::app::services::revocation_backend;
use warden_auth::InMemoryDirectory;
use warden_core::{AuthConfig, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_observability::init();

    let config = AuthConfig::from_env().context("invalid access-control configuration")?;
    tracing::info!(environment = ?config.environment, "configuration loaded");

    let clock = SystemClock::shared();
    let shared = revocation_backend(&config, clock.clone())?;

    // Accounts are owned by the embedding application; the standalone binary
    // starts with an empty directory.
    let directory = Arc::new(InMemoryDirectory::new());

    let bind_addr = config.bind_addr.clone();
    let services = AuthServices::build(config, clock, shared, directory);
    let app = warden_api::build_app(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
