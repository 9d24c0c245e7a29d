//! Folder Routes
//!
//! Routes:
//! - GET /folders - List folders with memory counts
//! - POST /folders - Create a folder
//! - DELETE /folders/:id - Delete a folder and its memories

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use keepsake_models::{Folder, FolderDraft, FolderSummary};
use serde::Deserialize;

use crate::{AppState, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_folders).post(create_folder))
        .route("/:id", delete(delete_folder))
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

async fn list_folders(State(state): State<AppState>) -> Json<Vec<FolderSummary>> {
    Json(state.repository.folder_summaries().await)
}

async fn create_folder(
    State(state): State<AppState>,
    Json(request): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<Folder>)> {
    let draft = FolderDraft {
        name: request.name,
        description: request.description,
    };
    let folder = state.repository.create_folder(draft).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.repository.delete_folder(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
