use std::sync::Arc;

use anyhow::Context;
use claims_service::config::load_service_config;
use claims_service::{build_router, AppState};
use common_claims::{ClaimsManager, FirestoreClient, IdentityToolkitClient};
use common_observability::ClaimsMetrics;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_service_config()?;
    let http_client = config.claims.http_client()?;
    let provider = IdentityToolkitClient::from_config(http_client.clone(), &config.claims);
    let store = FirestoreClient::from_config(http_client, &config.claims);
    let metrics = ClaimsMetrics::new().context("Failed to register metrics")?;

    let manager = ClaimsManager::from_config(Arc::new(provider), Arc::new(store), &config.claims)
        .with_metrics(metrics.clone());

    let addr = config.addr();
    info!(
        project_id = %config.claims.project_id,
        mirror_failure = ?config.claims.mirror_failure,
        "starting claims-service on {addr}"
    );

    let state = AppState {
        manager: Arc::new(manager),
        config: Arc::new(config),
        metrics: Arc::new(metrics),
    };
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
