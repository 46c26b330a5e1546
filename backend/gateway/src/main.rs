//! CrowdFund gateway: entry point.
//!
//! Connects to the contract (wallet first, read-only endpoint otherwise),
//! keeps an event subscription that bumps a refresh revision, and exposes
//! the gateway to a UI through a small Axum REST API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crowdfund_gateway::api::{self, ApiState};
use crowdfund_gateway::{Config, ConnectionManager, CrowdFundGateway, EthersConnector, EventSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // ─── Connection + gateway ─────────────────────────────
    let connector = Arc::new(EthersConnector::new(&config)?);
    let connections = Arc::new(ConnectionManager::new(connector));
    if let Err(e) = connections.init_provider().await {
        warn!("No connection at startup; retrying on first request: {e}");
    }
    let gateway = Arc::new(CrowdFundGateway::new(connections.clone()));

    // ─── Event subscription ───────────────────────────────
    let revision = Arc::new(AtomicU64::new(0));
    let subscriber = EventSubscriber::new(config.feed_options());
    let bump = revision.clone();
    if let Err(e) = subscriber
        .subscribe(&connections, move || {
            bump.fetch_add(1, Ordering::AcqRel);
        })
        .await
    {
        error!("Event subscription failed; the UI will not auto-refresh: {e}");
    }

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(ApiState { gateway, revision });

    let app = api::router(api_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    subscriber.unsubscribe();
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
