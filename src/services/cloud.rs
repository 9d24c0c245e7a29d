//! Cloud persistence: a remote relational table per collection plus a
//! blob bucket for file payloads.
//!
//! Every operation is a single remote call that may fail on its own.
//! Nothing here retries; the repository decides whether to fall back
//! to the local store.
//!
//! `SupabaseStore` speaks the PostgREST dialect for tables
//! (`/rest/v1/{table}`) and the storage API for the bucket
//! (`/storage/v1/object/{bucket}/{name}`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keepsake_models::{Folder, FolderDraft, Memory, MemoryContent, MemoryDraft};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CloudConfig;
use crate::error::{Error, Result};

/// Core trait for the remote backend.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Lightweight existence check against the memories table.
    async fn probe(&self) -> Result<()>;

    /// Insert a memory row and return what the server stored.
    async fn insert_memory(&self, row: &MemoryRow) -> Result<Memory>;

    /// Insert a folder row and return what the server stored.
    async fn insert_folder(&self, row: &FolderRow) -> Result<Folder>;

    /// Apply a partial update to one memory.
    ///
    /// Fails with `NotFound` when no remote row has this id.
    async fn update_memory(&self, id: &str, patch: &MemoryPatch) -> Result<Memory>;

    async fn delete_memory_record(&self, id: &str) -> Result<()>;

    /// Delete every memory row referencing `folder_id`.
    async fn delete_folder_memories(&self, folder_id: &str) -> Result<()>;

    async fn delete_folder_record(&self, id: &str) -> Result<()>;

    /// All memories, most recently modified first.
    async fn fetch_memories(&self) -> Result<Vec<Memory>>;

    /// All folders, most recently modified first.
    async fn fetch_folders(&self) -> Result<Vec<Folder>>;

    /// Upload bytes under `object_name`; returns the storage path.
    async fn upload_blob(&self, object_name: &str, bytes: Vec<u8>, mime_type: &str)
        -> Result<String>;

    /// Durable retrieval URL for an uploaded object.
    async fn blob_url(&self, storage_path: &str) -> Result<String>;

    async fn remove_blob(&self, storage_path: &str) -> Result<()>;

    /// Delete a memory, removing its blob first.
    ///
    /// Blob removal is best effort: a failure is logged and the metadata
    /// delete still runs, which may leave the object orphaned.
    async fn delete_memory(&self, memory: &Memory) -> Result<()> {
        if let Some(path) = memory.content.storage_path() {
            if let Err(e) = self.remove_blob(path).await {
                warn!(memory_id = %memory.id, storage_path = %path, error = %e, "Failed to remove blob, deleting metadata anyway");
            }
        }
        self.delete_memory_record(&memory.id).await
    }

    /// Delete a folder and the memories inside it.
    ///
    /// The memories go first. If that step fails the folder delete is
    /// still attempted, and only the folder delete decides the result.
    async fn delete_folder(&self, folder_id: &str) -> Result<()> {
        if let Err(e) = self.delete_folder_memories(folder_id).await {
            warn!(folder_id, error = %e, "Failed to delete memories in folder");
        }
        self.delete_folder_record(folder_id).await
    }
}

// ============================================================================
// Wire rows
// ============================================================================

/// Accept ids stored as either JSON strings or numbers.
fn de_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A row of the remote memories table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRow {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRow {
    /// Row for a new memory whose blob is already uploaded, stamped with
    /// the client clock.
    pub fn stamped(draft: &MemoryDraft, file_url: &str, storage_path: &str) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: draft.name.clone(),
            mime_type: draft.mime_type.clone(),
            size: draft.size,
            folder_id: draft.folder_id.clone(),
            file_url: Some(file_url.to_string()),
            storage_path: Some(storage_path.to_string()),
            description: Some(draft.description.clone()),
            tags: Some(draft.tags.iter().cloned().collect()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert to the domain model.
    ///
    /// Rows without an id or without both blob fields are rejected, so a
    /// memory never ends up with neither inline nor remote content.
    pub fn into_memory(self) -> Result<Memory> {
        let id = self
            .id
            .ok_or_else(|| Error::Cloud("memory row without id".to_string()))?;
        let content = match (self.file_url, self.storage_path) {
            (Some(url), Some(path)) => MemoryContent::remote(url, path),
            _ => {
                return Err(Error::Cloud(format!(
                    "memory row {} has no file_url/storage_path",
                    id
                )))
            }
        };

        Ok(Memory {
            id,
            name: self.name,
            mime_type: self.mime_type,
            size: self.size,
            folder_id: self.folder_id,
            content,
            description: self.description.unwrap_or_default(),
            tags: self.tags.unwrap_or_default().into_iter().collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A row of the remote folders table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRow {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FolderRow {
    pub fn stamped(draft: &FolderDraft) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: draft.name.clone(),
            description: draft.description.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn into_folder(self) -> Result<Folder> {
        let id = self
            .id
            .ok_or_else(|| Error::Cloud("folder row without id".to_string()))?;
        Ok(Folder {
            id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Partial update of a memory row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryPatch {
    pub folder_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Object name for an upload: millisecond prefix plus the original name.
pub fn blob_object_name(file_name: &str, at: DateTime<Utc>) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}_{}", at.timestamp_millis(), safe)
}

/// Decode a list of rows one by one, skipping the ones that do not fit.
fn decode_rows<R, T>(table: &str, values: Vec<Value>, convert: impl Fn(R) -> Result<T>) -> Vec<T>
where
    R: for<'de> Deserialize<'de>,
{
    values
        .into_iter()
        .filter_map(|value| {
            let decoded = serde_json::from_value::<R>(value)
                .map_err(Error::from)
                .and_then(&convert);
            match decoded {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(table, error = %e, "Skipping malformed remote row");
                    None
                }
            }
        })
        .collect()
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Cloud store backed by a Supabase project.
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    credential: String,
    bucket: String,
    memories_table: String,
    folders_table: String,
}

impl SupabaseStore {
    /// Build a client. No request timeout is set: a hung call only
    /// blocks its own operation.
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("keepsake/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            credential: config.credential.clone(),
            bucket: config.bucket_name.clone(),
            memories_table: config.tables.memories.clone(),
            folders_table: config.tables.folders.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn object_url(&self, storage_path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(storage_path)
        )
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.credential)
            .bearer_auth(&self.credential)
    }

    /// Turn non-2xx responses into errors carrying the body text.
    async fn check(operation: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Cloud(format!("{} failed ({}): {}", operation, status, body)))
    }

    async fn insert_row<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<Value> {
        let response = self
            .authed(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let response = Self::check("insert", response).await?;
        let mut rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            return Err(Error::Cloud(format!("insert into {} returned no rows", table)));
        }
        Ok(rows.swap_remove(0))
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<Value>> {
        let response = self
            .authed(self.client.get(self.table_url(table)))
            .query(&[("select", "*"), ("order", "updated_at.desc")])
            .send()
            .await?;
        let response = Self::check("fetch", response).await?;
        Ok(response.json().await?)
    }

    async fn delete_where(&self, table: &str, column: &str, value: &str) -> Result<()> {
        let response = self
            .authed(self.client.delete(self.table_url(table)))
            .query(&[(column, format!("eq.{}", value))])
            .send()
            .await?;
        Self::check("delete", response).await?;
        Ok(())
    }
}

#[async_trait]
impl CloudStore for SupabaseStore {
    async fn probe(&self) -> Result<()> {
        let response = self
            .authed(self.client.get(self.table_url(&self.memories_table)))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await?;
        Self::check("probe", response).await?;
        info!(endpoint = %self.base_url, "Cloud store reachable");
        Ok(())
    }

    async fn insert_memory(&self, row: &MemoryRow) -> Result<Memory> {
        let stored = self.insert_row(&self.memories_table, row).await?;
        let memory = serde_json::from_value::<MemoryRow>(stored)?.into_memory()?;
        debug!(memory_id = %memory.id, "Inserted remote memory");
        Ok(memory)
    }

    async fn insert_folder(&self, row: &FolderRow) -> Result<Folder> {
        let stored = self.insert_row(&self.folders_table, row).await?;
        let folder = serde_json::from_value::<FolderRow>(stored)?.into_folder()?;
        debug!(folder_id = %folder.id, "Inserted remote folder");
        Ok(folder)
    }

    async fn update_memory(&self, id: &str, patch: &MemoryPatch) -> Result<Memory> {
        let response = self
            .authed(self.client.patch(self.table_url(&self.memories_table)))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        let response = Self::check("update", response).await?;
        let rows: Vec<Value> = response.json().await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("remote memory {}", id)))?;
        serde_json::from_value::<MemoryRow>(row)?.into_memory()
    }

    async fn delete_memory_record(&self, id: &str) -> Result<()> {
        self.delete_where(&self.memories_table, "id", id).await
    }

    async fn delete_folder_memories(&self, folder_id: &str) -> Result<()> {
        self.delete_where(&self.memories_table, "folder_id", folder_id)
            .await
    }

    async fn delete_folder_record(&self, id: &str) -> Result<()> {
        self.delete_where(&self.folders_table, "id", id).await
    }

    async fn fetch_memories(&self) -> Result<Vec<Memory>> {
        let rows = self.fetch_rows(&self.memories_table).await?;
        Ok(decode_rows(&self.memories_table, rows, MemoryRow::into_memory))
    }

    async fn fetch_folders(&self) -> Result<Vec<Folder>> {
        let rows = self.fetch_rows(&self.folders_table).await?;
        Ok(decode_rows(&self.folders_table, rows, FolderRow::into_folder))
    }

    async fn upload_blob(
        &self,
        object_name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String> {
        let size = bytes.len();
        let response = self
            .authed(self.client.post(self.object_url(object_name)))
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await?;
        Self::check("upload", response).await?;
        info!(object = %object_name, bytes = size, "Uploaded blob");
        Ok(object_name.to_string())
    }

    async fn blob_url(&self, storage_path: &str) -> Result<String> {
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(storage_path)
        ))
    }

    async fn remove_blob(&self, storage_path: &str) -> Result<()> {
        let response = self
            .authed(
                self.client
                    .delete(format!("{}/storage/v1/object/{}", self.base_url, self.bucket)),
            )
            .json(&serde_json::json!({ "prefixes": [storage_path] }))
            .send()
            .await?;
        Self::check("remove blob", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_blob_object_name() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(blob_object_name("a.png", at), "1700000000123_a.png");
        assert_eq!(blob_object_name("dir/a.png", at), "1700000000123_dir_a.png");
    }

    #[test]
    fn test_memory_row_numeric_ids() {
        let row: MemoryRow = serde_json::from_value(json!({
            "id": 42,
            "name": "a.png",
            "type": "image/png",
            "size": 1024,
            "folder_id": 7,
            "file_url": "https://x/a.png",
            "storage_path": "1_a.png",
            "description": null,
            "tags": ["beach"],
            "created_at": "2025-02-21T10:00:00+00:00",
            "updated_at": "2025-02-21T10:00:00+00:00"
        }))
        .unwrap();

        let memory = row.into_memory().unwrap();
        assert_eq!(memory.id, "42");
        assert_eq!(memory.folder_id.as_deref(), Some("7"));
        assert_eq!(memory.content.storage_path(), Some("1_a.png"));
        assert!(memory.tags.contains("beach"));
        assert_eq!(memory.description, "");
    }

    #[test]
    fn test_memory_row_without_blob_is_rejected() {
        let row: MemoryRow = serde_json::from_value(json!({
            "id": "m1",
            "name": "a.png",
            "type": "image/png",
            "size": 1,
            "file_url": null,
            "storage_path": null,
            "created_at": "2025-02-21T10:00:00Z",
            "updated_at": "2025-02-21T10:00:00Z"
        }))
        .unwrap();
        assert!(row.into_memory().is_err());
    }

    #[test]
    fn test_stamped_row_omits_id() {
        let draft = MemoryDraft::new("a.png", "image/png", 3);
        let row = MemoryRow::stamped(&draft, "https://x/1_a.png", "1_a.png");
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["type"], "image/png");
        assert_eq!(row.created_at, row.updated_at);
    }

    #[test]
    fn test_decode_rows_skips_bad_rows() {
        let rows = vec![
            json!({"id": "f1", "name": "Trip", "created_at": "2025-02-21T10:00:00Z", "updated_at": "2025-02-21T10:00:00Z"}),
            json!({"id": "f2", "created_at": "nope"}),
        ];
        let folders = decode_rows("folders", rows, FolderRow::into_folder);
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].id, "f1");
    }
}
