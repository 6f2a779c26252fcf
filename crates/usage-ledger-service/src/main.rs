//! Usage Ledger Service - HTTP API for emission and credit ledgers.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usage_ledger_service::{create_router, AppState, ServiceConfig};
use usage_ledger_store::{PgStore, Store, StoreError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,usage_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Usage Ledger Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        postgres_configured = %config.database_url.is_some(),
        stripe_configured = %config.stripe_api_key.is_some(),
        webhook_secret_configured = %config.stripe_webhook_secret.is_some(),
        stripe_api_base = %config.stripe_api_base,
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;
    let state = AppState::new(store, config.clone());
    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, StoreError> {
    if let Some(url) = &config.database_url {
        tracing::info!("Connecting to PostgreSQL store");
        let store = PgStore::connect(url).await?;
        store.migrate().await?;
        return Ok(Arc::new(store));
    }

    open_local_store(config)
}

#[cfg(feature = "rocksdb-backend")]
fn open_local_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, StoreError> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(usage_ledger_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_local_store(_config: &ServiceConfig) -> Result<Arc<dyn Store>, StoreError> {
    tracing::warn!("No DATABASE_URL and RocksDB disabled - ledgers are kept in memory only");
    Ok(Arc::new(usage_ledger_store::MemoryStore::new()))
}
