//! API Routes for keepsake
//!
//! This module combines all API routes into a single router.

mod folders;
mod memories;
pub mod status;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Headroom for multipart framing and text fields on top of the file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the API routes.
///
/// Route structure:
/// - /health, /status, /stats, /theme - Status and preferences
/// - /memories/* - Memory listing, upload, download, move, delete
/// - /folders/* - Folder listing, creation, delete
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .nest("/memories", memories::routes())
        .nest("/folders", folders::routes())
}

/// Full application with middleware, ready to serve.
pub fn app(state: AppState, max_file_size: u64) -> Router {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .merge(routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
