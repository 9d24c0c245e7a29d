//! Keepsake - memory gallery server.
//!
//! Selects the cloud or local backend, loads the collections, starts the
//! reconciler and serves the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keepsake::services::{select_backend, MemoryRepository, Reconciler, StatusTracker};
use keepsake::{api, config, AppState};
use keepsake_storage::LocalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keepsake=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::init();
    tracing::info!(
        "Starting keepsake on {}:{}",
        config.server.host,
        config.server.port
    );

    let local = LocalStore::open(&config.storage.data_dir, config.storage.quota_bytes)
        .with_context(|| format!("Failed to open data dir {}", config.storage.data_dir))?;

    let status = Arc::new(StatusTracker::new());
    let mode = select_backend(&config.cloud, status.as_ref()).await;
    tracing::info!(mode = %mode, "Backend selected");

    let repository = MemoryRepository::new(mode, local, status.clone(), config.upload.clone());
    let snapshot = repository.load().await;
    tracing::info!(
        memories = snapshot.memories.len(),
        folders = snapshot.folders.len(),
        "Collections loaded"
    );

    let reconciler = config.sync.enabled.then(|| {
        Reconciler::new(repository.clone(), config.sync.interval()).start()
    });

    let state = AppState::new(repository, status);
    let app = api::app(state, config.upload.max_file_size);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(reconciler) = reconciler {
        reconciler.stop();
        reconciler.join().await;
    }
    tracing::info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
