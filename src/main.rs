mod config;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{catalog::Catalog, ingest::Ingestor};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<Catalog>,
    pub ingestor: Arc<Ingestor>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let catalog = Arc::new(Catalog::new());
        let ingestor = Ingestor::new(&config, catalog.clone())
            .context("Failed to initialize playlist ingestor")?;

        Ok(Self {
            config,
            catalog,
            ingestor: Arc::new(ingestor),
            start_time: Instant::now(),
        })
    }

    /// Whether catalog routes should answer 503 right now
    pub fn catalog_gated(&self) -> bool {
        self.config.wait_for_catalog && !self.ingestor.is_ready()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brasil_tv_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    config.validate()?;
    let port = config.port;

    tracing::info!("Starting Brasil TV Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Source playlist: {} (snapshot {})",
        config.m3u_url,
        config.snapshot_path.display()
    );
    if config.wait_for_catalog {
        tracing::info!("Catalog routes gated until the first ingestion run finishes");
    }

    let state = Arc::new(AppState::new(config)?);

    // Ingest in the background; the listener starts right away
    state.ingestor.clone().spawn_initial();
    tracing::info!("Initial ingestion started");

    let app = routes::router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
