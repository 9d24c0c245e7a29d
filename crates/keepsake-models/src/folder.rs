//! Folder model: a named grouping of memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Record;

/// A folder. Names are not unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    pub fn from_draft(id: String, draft: FolderDraft, stamped_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            created_at: stamped_at,
            updated_at: stamped_at,
        }
    }
}

impl Record for Folder {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Input for creating a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl FolderDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A folder together with the number of memories that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSummary {
    #[serde(flatten)]
    pub folder: Folder,
    pub memory_count: usize,
}
