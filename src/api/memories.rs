//! Memory Routes
//!
//! Routes:
//! - GET /memories - List memories (filters: category, q, folder_id)
//! - POST /memories - Upload a file as a new memory (multipart)
//! - GET /memories/:id - Get one memory
//! - GET /memories/:id/file - Download the file behind a memory
//! - PATCH /memories/:id/folder - Move a memory to another folder
//! - DELETE /memories/:id - Delete a memory

use std::collections::BTreeSet;

use axum::{
    extract::{
        multipart::{Field, MultipartError},
        rejection::QueryRejection,
        Multipart, Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use keepsake_models::{Memory, MemoryContent, MemoryDraft};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::parse_list;
use crate::services::MemoryFilter;
use crate::{AppState, Error, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_memories).post(upload_memory))
        .route("/:id", get(get_memory).delete(delete_memory))
        .route("/:id/file", get(download_memory))
        .route("/:id/folder", patch(move_memory))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MoveMemoryRequest {
    #[serde(default)]
    pub folder_id: Option<String>,
}

/// Where a listed memory's bytes live, without the inline payload itself.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentRef {
    Inline,
    Remote {
        file_url: String,
        storage_path: String,
    },
}

/// Listing entry. The file itself is served by `download_url`.
#[derive(Debug, Serialize)]
pub struct MemoryListItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub folder_id: Option<String>,
    pub content: ContentRef,
    pub download_url: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Memory> for MemoryListItem {
    fn from(memory: Memory) -> Self {
        let content = match memory.content {
            MemoryContent::Inline { .. } => ContentRef::Inline,
            MemoryContent::Remote {
                file_url,
                storage_path,
            } => ContentRef::Remote {
                file_url,
                storage_path,
            },
        };

        Self {
            download_url: format!("/memories/{}/file", memory.id),
            id: memory.id,
            name: memory.name,
            mime_type: memory.mime_type,
            size: memory.size,
            folder_id: memory.folder_id,
            content,
            description: memory.description,
            tags: memory.tags,
            created_at: memory.created_at,
            updated_at: memory.updated_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_memories(
    State(state): State<AppState>,
    filter: std::result::Result<Query<MemoryFilter>, QueryRejection>,
) -> Result<Json<Vec<MemoryListItem>>> {
    let Query(filter) = filter.map_err(|e| Error::InvalidInput(e.body_text()))?;

    let memories = state.repository.list_memories(&filter).await;
    Ok(Json(memories.into_iter().map(MemoryListItem::from).collect()))
}

async fn get_memory(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Memory>> {
    find_memory(&state, &id).await.map(Json)
}

/// Serve the file behind a memory.
///
/// Inline payloads are decoded and sent as an attachment; remote ones
/// redirect to their retrieval URL.
async fn download_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let memory = find_memory(&state, &id).await?;

    if let Some(file_url) = memory.content.file_url() {
        debug!(memory_id = %id, "Redirecting download to blob store");
        return Ok(Redirect::temporary(file_url).into_response());
    }

    let bytes = memory
        .content
        .inline_bytes()
        .ok_or_else(|| Error::Internal(format!("Memory {} has a corrupt inline payload", id)))?;

    let content_type = HeaderValue::from_str(&memory.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&attachment_disposition(&memory.name))
        .map_err(|e| Error::Internal(format!("Invalid download header: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Upload a memory.
///
/// Accepts multipart/form-data with a file field named "file" and
/// optional text fields "folder_id", "description" and "tags"
/// (comma separated).
async fn upload_memory(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Memory>)> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut folder_id = None;
    let mut description = String::new();
    let mut tags = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&state, e, "Failed to read multipart field"))?
    {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unnamed".into());

                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&filename)
                            .first_or_octet_stream()
                            .to_string()
                    });

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(&state, e, "Failed to read file"))?;

                file = Some((filename, content_type, data.to_vec()));
            }
            "folder_id" => folder_id = Some(read_text(&state, field).await?),
            "description" => description = read_text(&state, field).await?,
            "tags" => tags = parse_list(&read_text(&state, field).await?),
            other => debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let (name, mime_type, bytes) =
        file.ok_or_else(|| Error::InvalidInput("Missing file field".to_string()))?;

    let mut draft = MemoryDraft::new(name, mime_type, bytes.len() as u64).in_folder(folder_id);
    draft.description = description;
    draft.tags = tags.into_iter().collect();

    let memory = state.repository.upload_memory(draft, bytes).await?;
    Ok((StatusCode::CREATED, Json(memory)))
}

async fn read_text(state: &AppState, field: Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| multipart_error(state, e, "Failed to read field"))
}

/// Bodies cut off by the request size limit are reported like any other
/// oversized upload.
fn multipart_error(state: &AppState, error: MultipartError, context: &str) -> Error {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        state.repository.reject(Error::FileTooLarge {
            max_size: state.repository.max_file_size(),
        })
    } else {
        Error::InvalidInput(format!("{}: {}", context, error))
    }
}

async fn move_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MoveMemoryRequest>,
) -> Result<Json<Memory>> {
    let memory = state
        .repository
        .move_memory(&id, request.folder_id.as_deref())
        .await?;
    Ok(Json(memory))
}

async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.repository.delete_memory(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn find_memory(state: &AppState, id: &str) -> Result<Memory> {
    state
        .repository
        .get_memory(id)
        .await
        .ok_or_else(|| Error::NotFound(format!("Memory {}", id)))
}

/// `Content-Disposition` value with an ASCII fallback name plus the exact
/// name percent-encoded.
fn attachment_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_disposition_escapes_name() {
        assert_eq!(
            attachment_disposition("my \"best\" photo.png"),
            "attachment; filename=\"my _best_ photo.png\"; \
             filename*=UTF-8''my%20%22best%22%20photo.png"
        );
        let unicode = attachment_disposition("café.png");
        assert!(unicode.starts_with("attachment; filename=\"caf_.png\""));
        assert!(unicode.ends_with("caf%C3%A9.png"));
    }

    #[test]
    fn test_list_item_drops_inline_payload() {
        let memory = Memory::from_draft(
            "m1".to_string(),
            MemoryDraft::new("a.png", "image/png", 3),
            MemoryContent::inline(b"abc"),
            Utc::now(),
        );

        let json = serde_json::to_value(MemoryListItem::from(memory)).unwrap();

        assert_eq!(json["content"], serde_json::json!({ "kind": "inline" }));
        assert_eq!(json["download_url"], "/memories/m1/file");
        assert_eq!(json["type"], "image/png");
    }
}
