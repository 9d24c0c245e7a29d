//! Status Routes
//!
//! Routes:
//! - GET /health - Basic health check
//! - GET /status - Backend mode, last status event, last sync, stats
//! - GET /stats - Memory count and total size
//! - GET /theme, PUT /theme, DELETE /theme - Persisted theme name

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use keepsake_models::MemoryStats;
use keepsake_storage::LocalStore;
use serde::{Deserialize, Serialize};

use crate::services::{Notice, StatusEvent};
use crate::{AppState, Error, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(system_status))
        .route("/stats", get(stats))
        .route("/theme", get(get_theme).put(set_theme).delete(clear_theme))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub mode: &'static str,
    pub version: String,
    pub uptime_seconds: u64,
    pub status: Option<StatusEvent>,
    pub last_sync: Option<DateTime<Utc>>,
    pub stats: MemoryStats,
    pub folders: usize,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThemeBody {
    pub theme: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

async fn system_status(State(state): State<AppState>) -> Json<SystemStatusResponse> {
    let repository = &state.repository;

    Json(SystemStatusResponse {
        mode: repository.mode().as_str(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        status: state.status.last_status(),
        last_sync: repository.last_sync().await,
        stats: repository.stats().await,
        folders: repository.list().await.folders.len(),
        notices: state.status.recent_notices(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<MemoryStats> {
    Json(state.repository.stats().await)
}

async fn get_theme(State(state): State<AppState>) -> Result<Json<ThemeBody>> {
    let theme = with_local_store(&state, |local| Ok(local.theme())).await?;
    Ok(Json(ThemeBody { theme }))
}

async fn set_theme(
    State(state): State<AppState>,
    Json(body): Json<ThemeBody>,
) -> Result<Json<ThemeBody>> {
    let theme = body
        .theme
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Validation("Theme name is required".to_string()))?;

    let stored = theme.clone();
    with_local_store(&state, move |local| local.set_theme(&stored)).await?;
    Ok(Json(ThemeBody { theme: Some(theme) }))
}

async fn clear_theme(State(state): State<AppState>) -> Result<StatusCode> {
    with_local_store(&state, |local| local.clear_theme()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Run a local store call on the blocking pool.
async fn with_local_store<T, F>(state: &AppState, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&LocalStore) -> keepsake_storage::Result<T> + Send + 'static,
{
    let local = state.repository.local_store().clone();
    let value = tokio::task::spawn_blocking(move || f(&local))
        .await
        .map_err(|e| Error::Internal(format!("Local store task failed: {}", e)))??;
    Ok(value)
}
