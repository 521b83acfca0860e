//! booking-gateway server entry point.
//!
//! Picks the storage backend and payment gateway from configuration, then
//! starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use booking_gateway::api;
use booking_gateway::app_state::AppState;
use booking_gateway::config::{DEV_WEBHOOK_SECRET, GatewayConfig, LogFormat, StorageBackend};
use booking_gateway::payment::{FakeGateway, PaymentGateway, StripeGateway};
use booking_gateway::persistence::BookingStore;
use booking_gateway::persistence::memory::MemoryStore;
use booking_gateway::persistence::postgres::PostgresStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, ?config, "starting booking-gateway");

    let store = open_store(&config).await?;
    let gateway = open_gateway(&config)?;
    if config.stripe_webhook_secret == DEV_WEBHOOK_SECRET {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set; using the development secret");
    }

    let app_state = AppState::from_config(&config, store, gateway);
    let app = api::build_app(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn open_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn BookingStore>> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            let store = PostgresStore::connect(config)
                .await
                .context("connecting to PostgreSQL")?;
            store.migrate().await.context("applying migrations")?;
            tracing::info!("using PostgreSQL storage");
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            let store = match &config.memory_seed_path {
                Some(path) => MemoryStore::from_seed_file(path)
                    .await
                    .with_context(|| format!("loading seed {}", path.display()))?,
                None => MemoryStore::new(),
            };
            tracing::warn!("using in-memory storage; bookings are lost on restart");
            Ok(Arc::new(store))
        }
    }
}

fn open_gateway(config: &GatewayConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match &config.stripe_secret_key {
        Some(key) => {
            let gateway = StripeGateway::new(
                key.clone(),
                config.stripe_api_base.clone(),
                Duration::from_secs(config.gateway_timeout_secs),
            )
            .context("building Stripe client")?;
            Ok(Arc::new(gateway))
        }
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set; payments go to the in-process fake gateway");
            Ok(Arc::new(FakeGateway::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
