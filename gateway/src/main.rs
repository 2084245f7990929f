//! Coffer Gateway Binary
//!
//! Serves the account ledger over HTTP.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coffer_gateway::{router, AppState, GatewayConfig, GatewayState, StoreBackend};
use coffer_ledger::store::postgres::PgStoreOptions;
use coffer_ledger::{AccountStore, LedgerEngine, MemoryAccountStore, PgAccountStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Coffer gateway");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let listener = TcpListener::bind(config.bind_addr()).await?;

    match config.store_backend().map_err(anyhow::Error::msg)? {
        StoreBackend::Memory => {
            info!("Using in-memory account store");
            serve(Arc::new(MemoryAccountStore::new()), &config, listener).await?;
        }
        StoreBackend::Postgres => {
            let url = config.database.url.as_deref().unwrap_or_default();
            let options = PgStoreOptions {
                max_connections: config.database.max_connections,
                acquire_timeout: config.database.acquire_timeout,
            };
            let store = PgAccountStore::connect(url, &options).await?;
            store.ensure_schema().await?;

            serve(Arc::new(store.clone()), &config, listener).await?;
            store.close().await;
        }
    }

    info!("Gateway shutdown complete");
    Ok(())
}

async fn serve<S: AccountStore>(
    store: Arc<S>,
    config: &GatewayConfig,
    listener: TcpListener,
) -> anyhow::Result<()> {
    let engine = Arc::new(LedgerEngine::new(store, config.ledger.clone()));
    let state = AppState::new(engine);
    let app = router(state.clone());

    state.set_state(GatewayState::Running);
    info!(
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        store = %config.store,
        "Gateway running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal<S: AccountStore>(state: AppState<S>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");
    info!("Shutdown signal received");
    state.set_state(GatewayState::ShuttingDown);
}
