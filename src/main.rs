use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use netflux::{
    config::{Config, GatewayBackend},
    db::{create_pool, create_redis_client, Cache},
    gateway::{InMemoryGateway, PgGateway, RemoteGateway},
    routes::{create_router, AppState},
    services::{
        notification_producer::spawn_producer,
        providers::{MetadataProvider, OmdbProvider},
    },
    sync::SessionRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("netflux=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let gateway: Arc<dyn RemoteGateway> = match config.gateway_backend {
        GatewayBackend::Postgres => {
            let pool = create_pool(&config.database_url)
                .await
                .context("Failed to connect to Postgres")?;
            Arc::new(PgGateway::new(pool))
        }
        GatewayBackend::Memory => {
            tracing::warn!("Using the in-memory gateway; all data is lost on exit");
            Arc::new(InMemoryGateway::new())
        }
    };

    let (cache, cache_writer) = match config.redis_url.as_deref() {
        Some(url) => {
            let (cache, handle) = Cache::new(create_redis_client(url)?);
            tracing::info!("Metadata cache enabled");
            (Some(cache), Some(handle))
        }
        None => (None, None),
    };

    let metadata: Arc<dyn MetadataProvider> = Arc::new(OmdbProvider::new(
        config.omdb_api_key.clone(),
        config.omdb_api_url.clone(),
        cache,
    ));

    let producer = config.notification_interval_secs.map(|secs| {
        spawn_producer(
            gateway.clone(),
            metadata.clone(),
            Duration::from_secs(secs.max(1)),
        )
    });

    let idle_timeout = config.session_idle_timeout();
    let sessions = SessionRegistry::with_idle_timeout(gateway.clone(), idle_timeout);
    let sweeper = sessions.spawn_idle_sweeper(idle_timeout.min(Duration::from_secs(60)));

    let app = create_router(AppState::with_sessions(gateway, metadata, sessions));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(address = %address, "Netflux listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(producer) = producer {
        producer.abort();
    }
    sweeper.abort();
    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
