//! Memory model: an uploaded photo, video or document.

use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Record;

/// Where the bytes of a memory live.
///
/// A memory carries exactly one of these once its upload has completed:
/// the local backend keeps the payload inline, the cloud backend keeps a
/// retrieval URL plus the object name inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryContent {
    /// Base64-encoded file payload.
    Inline { data: String },
    /// Object in the remote blob store.
    Remote {
        file_url: String,
        storage_path: String,
    },
}

impl MemoryContent {
    /// Build inline content from raw bytes.
    pub fn inline(bytes: &[u8]) -> Self {
        MemoryContent::Inline {
            data: STANDARD.encode(bytes),
        }
    }

    pub fn remote(file_url: impl Into<String>, storage_path: impl Into<String>) -> Self {
        MemoryContent::Remote {
            file_url: file_url.into(),
            storage_path: storage_path.into(),
        }
    }

    /// Blob object name, if the content lives in the remote store.
    pub fn storage_path(&self) -> Option<&str> {
        match self {
            MemoryContent::Remote { storage_path, .. } => Some(storage_path),
            MemoryContent::Inline { .. } => None,
        }
    }

    pub fn file_url(&self) -> Option<&str> {
        match self {
            MemoryContent::Remote { file_url, .. } => Some(file_url),
            MemoryContent::Inline { .. } => None,
        }
    }

    /// Decode an inline payload back to bytes.
    pub fn inline_bytes(&self) -> Option<Vec<u8>> {
        match self {
            MemoryContent::Inline { data } => STANDARD.decode(data).ok(),
            MemoryContent::Remote { .. } => None,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, MemoryContent::Inline { .. })
    }
}

/// A user-uploaded file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub name: String,
    /// MIME type as reported by the uploader.
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    #[serde(default)]
    pub folder_id: Option<String>,
    pub content: MemoryContent,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Materialize a draft once a backend has assigned the id and content.
    pub fn from_draft(
        id: String,
        draft: MemoryDraft,
        content: MemoryContent,
        stamped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: draft.name,
            mime_type: draft.mime_type,
            size: draft.size,
            folder_id: draft.folder_id,
            content,
            description: draft.description,
            tags: draft.tags,
            created_at: stamped_at,
            updated_at: stamped_at,
        }
    }

    pub fn category(&self) -> MemoryCategory {
        MemoryCategory::of(&self.mime_type)
    }

    /// Case-insensitive match against name and description.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
    }
}

impl Record for Memory {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Metadata for a memory that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl MemoryDraft {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            ..Default::default()
        }
    }

    pub fn in_folder(mut self, folder_id: Option<String>) -> Self {
        self.folder_id = folder_id;
        self
    }
}

/// Coarse grouping of memories by MIME type, used for list filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    All,
    Image,
    Video,
    Document,
    Archive,
    Other,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::All => "all",
            MemoryCategory::Image => "image",
            MemoryCategory::Video => "video",
            MemoryCategory::Document => "document",
            MemoryCategory::Archive => "archive",
            MemoryCategory::Other => "other",
        }
    }

    /// Classify a MIME type.
    pub fn of(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            MemoryCategory::Image
        } else if mime_type.starts_with("video/") {
            MemoryCategory::Video
        } else if mime_type.contains("pdf") || mime_type.contains("text") {
            MemoryCategory::Document
        } else if mime_type.contains("zip") || mime_type.contains("rar") {
            MemoryCategory::Archive
        } else {
            MemoryCategory::Other
        }
    }

    /// Whether a memory with this MIME type belongs to the category.
    pub fn matches(&self, mime_type: &str) -> bool {
        match self {
            MemoryCategory::All => true,
            other => Self::of(mime_type) == *other,
        }
    }
}

impl Default for MemoryCategory {
    fn default() -> Self {
        MemoryCategory::All
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate numbers shown next to the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub total_size: u64,
    pub formatted_size: String,
}

impl MemoryStats {
    pub fn from_memories(memories: &[Memory]) -> Self {
        let total_size = memories.iter().map(|m| m.size).sum();
        Self {
            total_memories: memories.len(),
            total_size,
            formatted_size: crate::format_file_size(total_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample(mime: &str) -> Memory {
        Memory::from_draft(
            "m1".to_string(),
            MemoryDraft::new("Beach Day.PNG", mime, 10),
            MemoryContent::inline(b"abc"),
            Utc::now(),
        )
    }

    #[rstest]
    #[case("image/png", MemoryCategory::Image)]
    #[case("video/mp4", MemoryCategory::Video)]
    #[case("application/pdf", MemoryCategory::Document)]
    #[case("text/plain", MemoryCategory::Document)]
    #[case("application/zip", MemoryCategory::Archive)]
    #[case("application/x-rar-compressed", MemoryCategory::Archive)]
    #[case("application/octet-stream", MemoryCategory::Other)]
    fn test_category_of(#[case] mime: &str, #[case] expected: MemoryCategory) {
        assert_eq!(MemoryCategory::of(mime), expected);
    }

    #[test]
    fn test_all_matches_everything() {
        assert!(MemoryCategory::All.matches("application/octet-stream"));
        assert!(!MemoryCategory::Video.matches("image/png"));
    }

    #[test]
    fn test_inline_content_roundtrip_bytes() {
        let content = MemoryContent::inline(b"hello");
        assert!(content.is_inline());
        assert_eq!(content.inline_bytes().unwrap(), b"hello".to_vec());
        assert!(content.storage_path().is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let memory = sample("image/png");
        let json = serde_json::to_value(&memory).unwrap();
        assert_eq!(json["type"], "image/png");
        assert_eq!(json["content"]["kind"], "inline");
        assert!(json["folder_id"].is_null());
    }

    #[test]
    fn test_matches_query_is_case_insensitive() {
        let mut memory = sample("image/png");
        memory.description = "Sunset at the pier".to_string();
        assert!(memory.matches_query("beach"));
        assert!(memory.matches_query("PIER"));
        assert!(!memory.matches_query("mountain"));
    }

    #[test]
    fn test_stats() {
        let mut a = sample("image/png");
        a.size = 1024;
        let mut b = sample("video/mp4");
        b.size = 512;
        let stats = MemoryStats::from_memories(&[a, b]);
        assert_eq!(stats.total_memories, 2);
        assert_eq!(stats.total_size, 1536);
        assert_eq!(stats.formatted_size, "1.5 KB");
    }
}
