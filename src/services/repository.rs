//! Memory/folder repository.
//!
//! The single entry point for reading and changing memories and folders.
//! It owns the in-memory cache, routes each write to the selected backend
//! and falls back to the local store once when a cloud call fails. The
//! fallback is per call: cloud stays selected for the next one.
//!
//! Every successful mutation is mirrored to the local store and announced
//! to the observer with the current collections.
//!
//! The cache lock is never held across a remote call, so concurrent
//! writes and sync ticks apply their results in arrival order. It is held
//! while the local mirror is written on the blocking pool, which keeps
//! those writes in the same order as the cache changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use keepsake_models::{
    new_local_id, Folder, FolderDraft, FolderSummary, Memory, MemoryCategory, MemoryContent,
    MemoryDraft, MemoryStats,
};
use keepsake_storage::{CollectionKind, LocalStore};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::services::backend::BackendMode;
use crate::services::cloud::{blob_object_name, CloudStore, FolderRow, MemoryPatch, MemoryRow};
use crate::services::observer::{
    Notice, NoticeLevel, RepositoryObserver, StatusEvent, StatusState,
};
use crate::services::reconciler::{merge_records, MergeStats};
use crate::services::validation::{normalize_folder, normalize_folder_ref, validate_upload};

/// Filter applied to memory listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemoryFilter {
    #[serde(default)]
    pub category: MemoryCategory,
    /// Case-insensitive search over name and description.
    #[serde(default, rename = "q")]
    pub query: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
}

impl MemoryFilter {
    pub fn matches(&self, memory: &Memory) -> bool {
        if !self.category.matches(&memory.mime_type) {
            return false;
        }
        if let Some(folder_id) = normalize_folder_ref(self.folder_id.as_deref()) {
            if memory.folder_id.as_deref() != Some(folder_id.as_str()) {
                return false;
            }
        }
        match self.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => memory.matches_query(query),
            _ => true,
        }
    }
}

/// Point-in-time copy of both collections.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub memories: Vec<Memory>,
    pub folders: Vec<Folder>,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub memories: MergeStats,
    pub folders: MergeStats,
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        self.memories.changed() || self.folders.changed()
    }

    /// Status line for the observer, if anything changed.
    pub fn summary(&self) -> Option<String> {
        if !self.changed() {
            return None;
        }
        let mut parts = Vec::new();
        if self.memories.added > 0 {
            parts.push(format!("{} new memories synced", self.memories.added));
        }
        if self.memories.updated > 0 {
            parts.push(format!("{} memories updated", self.memories.updated));
        }
        if self.folders.added > 0 {
            parts.push(format!("{} new folders synced", self.folders.added));
        }
        if self.folders.updated > 0 {
            parts.push(format!("{} folders updated", self.folders.updated));
        }
        Some(parts.join(", "))
    }
}

#[derive(Default)]
struct Cache {
    memories: Vec<Memory>,
    folders: Vec<Folder>,
}

struct Inner {
    mode: BackendMode,
    local: LocalStore,
    cache: RwLock<Cache>,
    observer: Arc<dyn RepositoryObserver>,
    upload: UploadConfig,
    last_sync: RwLock<Option<DateTime<Utc>>>,
}

/// Cheap to clone; all clones share the same cache.
#[derive(Clone)]
pub struct MemoryRepository {
    inner: Arc<Inner>,
}

impl MemoryRepository {
    pub fn new(
        mode: BackendMode,
        local: LocalStore,
        observer: Arc<dyn RepositoryObserver>,
        upload: UploadConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                mode,
                local,
                cache: RwLock::new(Cache::default()),
                observer,
                upload,
                last_sync: RwLock::new(None),
            }),
        }
    }

    pub fn mode(&self) -> &BackendMode {
        &self.inner.mode
    }

    pub fn local_store(&self) -> &LocalStore {
        &self.inner.local
    }

    /// Largest accepted upload, in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.inner.upload.max_file_size
    }

    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_sync.read().await
    }

    // ------------------------------------------------------------------
    // Loading and sync
    // ------------------------------------------------------------------

    /// Fill the cache from the local store, then merge the cloud copy on
    /// top when cloud is selected. Remote failures keep the local view.
    pub async fn load(&self) -> Snapshot {
        let local = self.inner.local.clone();
        let (memories, folders) = tokio::task::spawn_blocking(move || {
            let memories: Vec<Memory> = local.load(CollectionKind::Memories);
            let folders: Vec<Folder> = local.load(CollectionKind::Folders);
            (memories, folders)
        })
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Local load task failed, starting empty");
            (Vec::new(), Vec::new())
        });
        info!(
            memories = memories.len(),
            folders = folders.len(),
            "Loaded local collections"
        );

        {
            let mut cache = self.inner.cache.write().await;
            cache.memories = memories;
            cache.folders = folders;
        }

        if self.inner.mode.is_cloud() {
            self.sync_once().await;
        }

        let cache = self.inner.cache.read().await;
        self.inner.observer.on_render(&cache.memories, &cache.folders);
        Snapshot {
            memories: cache.memories.clone(),
            folders: cache.folders.clone(),
        }
    }

    /// Pull both remote collections and merge them into the cache.
    ///
    /// Each fetch is independent; a failed one is skipped silently apart
    /// from the log line. Does nothing in local mode.
    pub async fn sync_once(&self) -> SyncOutcome {
        let Some(store) = self.inner.mode.cloud() else {
            return SyncOutcome::default();
        };

        let remote_memories = match store.fetch_memories().await {
            Ok(memories) => Some(memories),
            Err(e) => {
                warn!(error = %e, "Failed to fetch remote memories");
                None
            }
        };
        let remote_folders = match store.fetch_folders().await {
            Ok(folders) => Some(folders),
            Err(e) => {
                warn!(error = %e, "Failed to fetch remote folders");
                None
            }
        };

        let fetched = remote_memories.is_some() || remote_folders.is_some();
        let outcome = self.apply_remote(remote_memories, remote_folders).await;

        if fetched {
            *self.inner.last_sync.write().await = Some(Utc::now());
        }
        if let Some(summary) = outcome.summary() {
            info!(
                memories_added = outcome.memories.added,
                memories_updated = outcome.memories.updated,
                folders_added = outcome.folders.added,
                folders_updated = outcome.folders.updated,
                "Reconciled remote state"
            );
            self.inner
                .observer
                .on_status(&StatusEvent::new(StatusState::CloudConnected, summary));
        } else {
            debug!("Sync pass found no changes");
        }
        outcome
    }

    /// Merge already fetched remote records into the cache.
    pub async fn apply_remote(
        &self,
        memories: Option<Vec<Memory>>,
        folders: Option<Vec<Folder>>,
    ) -> SyncOutcome {
        let mut cache = self.inner.cache.write().await;
        let outcome = SyncOutcome {
            memories: memories
                .map(|remote| merge_records(&mut cache.memories, remote))
                .unwrap_or_default(),
            folders: folders
                .map(|remote| merge_records(&mut cache.folders, remote))
                .unwrap_or_default(),
        };

        if outcome.changed() {
            self.persist(&cache).await;
            self.inner.observer.on_render(&cache.memories, &cache.folders);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Save an uploaded file as a new memory.
    ///
    /// Cloud mode uploads the blob, resolves its URL and inserts the
    /// metadata row. Any failure along the way falls back to a local
    /// memory carrying the bytes inline.
    pub async fn upload_memory(&self, mut draft: MemoryDraft, bytes: Vec<u8>) -> Result<Memory> {
        draft.size = bytes.len() as u64;
        if let Err(e) = validate_upload(&self.inner.upload, &draft.name, &draft.mime_type, draft.size)
        {
            return Err(self.reject(e));
        }
        draft.folder_id = normalize_folder_ref(draft.folder_id.as_deref());

        if let Some(store) = self.inner.mode.cloud() {
            match Self::upload_to_cloud(store.as_ref(), &draft, bytes.clone()).await {
                Ok(memory) => {
                    info!(memory_id = %memory.id, name = %memory.name, "Memory saved to cloud");
                    self.insert_memory(memory.clone()).await;
                    self.notify(NoticeLevel::Success, "Memory uploaded successfully!");
                    return Ok(memory);
                }
                Err(e) => {
                    warn!(name = %draft.name, error = %e, "Cloud upload failed, saving locally");
                    self.notify(NoticeLevel::Warning, "Cloud unavailable, saved locally");
                }
            }
        }

        let memory = Memory::from_draft(
            new_local_id(),
            draft,
            MemoryContent::inline(&bytes),
            Utc::now(),
        );
        info!(memory_id = %memory.id, name = %memory.name, size = memory.size, "Memory saved locally");
        self.insert_memory(memory.clone()).await;
        if !self.inner.mode.is_cloud() {
            self.notify(NoticeLevel::Success, "Memory saved locally!");
        }
        Ok(memory)
    }

    async fn upload_to_cloud(
        store: &dyn CloudStore,
        draft: &MemoryDraft,
        bytes: Vec<u8>,
    ) -> Result<Memory> {
        let object_name = blob_object_name(&draft.name, Utc::now());
        let storage_path = store
            .upload_blob(&object_name, bytes, &draft.mime_type)
            .await?;

        let stored = match store.blob_url(&storage_path).await {
            Ok(file_url) => {
                store
                    .insert_memory(&MemoryRow::stamped(draft, &file_url, &storage_path))
                    .await
            }
            Err(e) => Err(e),
        };

        if stored.is_err() {
            if let Err(e) = store.remove_blob(&storage_path).await {
                warn!(storage_path = %storage_path, error = %e, "Failed to remove orphaned blob");
            }
        }
        stored
    }

    /// Create a folder. Blank names are rejected before anything is stored.
    pub async fn create_folder(&self, draft: FolderDraft) -> Result<Folder> {
        let draft = match normalize_folder(draft) {
            Ok(draft) => draft,
            Err(e) => return Err(self.reject(e)),
        };

        let mut folder = None;
        if let Some(store) = self.inner.mode.cloud() {
            match store.insert_folder(&FolderRow::stamped(&draft)).await {
                Ok(stored) => folder = Some(stored),
                Err(e) => {
                    warn!(name = %draft.name, error = %e, "Cloud folder insert failed, saving locally");
                    self.notify(NoticeLevel::Warning, "Cloud unavailable, folder saved locally");
                }
            }
        }
        let folder =
            folder.unwrap_or_else(|| Folder::from_draft(new_local_id(), draft, Utc::now()));

        info!(folder_id = %folder.id, name = %folder.name, "Folder created");
        {
            let mut cache = self.inner.cache.write().await;
            cache.folders.insert(0, folder.clone());
            self.commit(&cache).await;
        }
        self.notify(NoticeLevel::Success, "Folder created successfully!");
        Ok(folder)
    }

    /// Delete a memory by id.
    pub async fn delete_memory(&self, id: &str) -> Result<()> {
        let memory = self
            .get_memory(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Memory {}", id)))?;

        if let Some(store) = self.inner.mode.cloud() {
            if let Err(e) = store.delete_memory(&memory).await {
                warn!(memory_id = %id, error = %e, "Cloud delete failed, deleting locally");
            }
        }

        {
            let mut cache = self.inner.cache.write().await;
            cache.memories.retain(|m| m.id != id);
            self.commit(&cache).await;
        }
        info!(memory_id = %id, "Memory deleted");
        self.notify(NoticeLevel::Success, "Memory deleted");
        Ok(())
    }

    /// Delete a folder together with every memory inside it.
    pub async fn delete_folder(&self, id: &str) -> Result<()> {
        if !self.inner.cache.read().await.folders.iter().any(|f| f.id == id) {
            return Err(Error::NotFound(format!("Folder {}", id)));
        }

        if let Some(store) = self.inner.mode.cloud() {
            if let Err(e) = store.delete_folder(id).await {
                warn!(folder_id = %id, error = %e, "Cloud folder delete failed, deleting locally");
            }
        }

        let removed = {
            let mut cache = self.inner.cache.write().await;
            let before = cache.memories.len();
            cache
                .memories
                .retain(|m| m.folder_id.as_deref() != Some(id));
            cache.folders.retain(|f| f.id != id);
            self.commit(&cache).await;
            before - cache.memories.len()
        };
        info!(folder_id = %id, memories_removed = removed, "Folder deleted");
        self.notify(NoticeLevel::Success, "Folder deleted");
        Ok(())
    }

    /// Reassign a memory to another folder, or to none with `None` or "".
    pub async fn move_memory(&self, id: &str, folder_id: Option<&str>) -> Result<Memory> {
        if self.get_memory(id).await.is_none() {
            return Err(Error::NotFound(format!("Memory {}", id)));
        }
        let patch = MemoryPatch {
            folder_id: normalize_folder_ref(folder_id),
            updated_at: Utc::now(),
        };

        let mut remote = None;
        if let Some(store) = self.inner.mode.cloud() {
            match store.update_memory(id, &patch).await {
                Ok(updated) => remote = Some(updated),
                Err(e) => {
                    warn!(memory_id = %id, error = %e, "Cloud move failed, updating locally");
                }
            }
        }

        let moved = {
            let mut cache = self.inner.cache.write().await;
            let entry = cache
                .memories
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| Error::NotFound(format!("Memory {}", id)))?;
            match remote {
                Some(updated) => *entry = updated,
                None => {
                    entry.folder_id = patch.folder_id.clone();
                    entry.updated_at = patch.updated_at;
                }
            }
            let moved = entry.clone();
            self.commit(&cache).await;
            moved
        };

        info!(memory_id = %id, folder_id = ?moved.folder_id, "Memory moved");
        self.notify(NoticeLevel::Success, "Memory moved");
        Ok(moved)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn list(&self) -> Snapshot {
        let cache = self.inner.cache.read().await;
        Snapshot {
            memories: cache.memories.clone(),
            folders: cache.folders.clone(),
        }
    }

    pub async fn list_memories(&self, filter: &MemoryFilter) -> Vec<Memory> {
        self.inner
            .cache
            .read()
            .await
            .memories
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect()
    }

    pub async fn get_memory(&self, id: &str) -> Option<Memory> {
        self.inner
            .cache
            .read()
            .await
            .memories
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// Folders with the number of memories referencing each.
    pub async fn folder_summaries(&self) -> Vec<FolderSummary> {
        let cache = self.inner.cache.read().await;
        cache
            .folders
            .iter()
            .map(|folder| FolderSummary {
                memory_count: cache
                    .memories
                    .iter()
                    .filter(|m| m.folder_id.as_deref() == Some(folder.id.as_str()))
                    .count(),
                folder: folder.clone(),
            })
            .collect()
    }

    pub async fn stats(&self) -> MemoryStats {
        MemoryStats::from_memories(&self.inner.cache.read().await.memories)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn insert_memory(&self, memory: Memory) {
        let mut cache = self.inner.cache.write().await;
        cache.memories.insert(0, memory);
        self.commit(&cache).await;
    }

    /// Mirror to the local store and render.
    async fn commit(&self, cache: &Cache) {
        self.persist(cache).await;
        self.inner.observer.on_render(&cache.memories, &cache.folders);
    }

    /// Write both collections to the local store. Failures are reported
    /// but leave the cache authoritative.
    ///
    /// Callers hold the cache write guard across this call.
    async fn persist(&self, cache: &Cache) {
        let local = self.inner.local.clone();
        let memories = cache.memories.clone();
        let folders = cache.folders.clone();

        let result = tokio::task::spawn_blocking(move || {
            local.save(CollectionKind::Memories, &memories)?;
            local.save(CollectionKind::Folders, &folders)?;
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::Internal(format!("Local save task failed: {}", e)))
        .and_then(|saved| saved);

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist local collections");
            self.inner.observer.on_status(&StatusEvent::new(
                StatusState::Error,
                format!("Local save failed: {}", e),
            ));
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.inner.observer.on_notice(&Notice::new(level, message));
    }

    /// Report a rejected input as an error notice and hand the error back.
    pub fn reject(&self, error: Error) -> Error {
        debug!(error = %error, "Rejected input");
        let message = match &error {
            Error::Validation(msg) | Error::InvalidFileType(msg) => msg.clone(),
            other => other.to_string(),
        };
        self.inner
            .observer
            .on_notice(&Notice::new(NoticeLevel::Error, message));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::observer::StatusTracker;

    fn local_repository() -> (MemoryRepository, Arc<StatusTracker>) {
        let tracker = Arc::new(StatusTracker::new());
        let repository = MemoryRepository::new(
            BackendMode::Local,
            LocalStore::in_memory(),
            tracker.clone(),
            UploadConfig::default(),
        );
        (repository, tracker)
    }

    #[tokio::test]
    async fn test_upload_stores_inline_content() {
        let (repo, _) = local_repository();

        let memory = repo
            .upload_memory(MemoryDraft::new("a.png", "image/png", 0), vec![1, 2, 3])
            .await
            .unwrap();

        assert!(memory.content.is_inline());
        assert_eq!(memory.size, 3);
        assert_eq!(repo.list().await.memories.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_upload_emits_error_notice() {
        let (repo, tracker) = local_repository();

        let err = repo
            .upload_memory(MemoryDraft::new("x.exe", "application/x-msdownload", 0), vec![0])
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(repo.list().await.memories.is_empty());
        let notices = tracker.recent_notices();
        assert_eq!(notices.last().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_new_memories_are_prepended() {
        let (repo, _) = local_repository();
        repo.upload_memory(MemoryDraft::new("first.png", "image/png", 0), vec![1])
            .await
            .unwrap();
        repo.upload_memory(MemoryDraft::new("second.png", "image/png", 0), vec![2])
            .await
            .unwrap();

        let names: Vec<_> = repo
            .list()
            .await
            .memories
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["second.png", "first.png"]);
    }

    #[tokio::test]
    async fn test_move_to_empty_folder_clears_reference() {
        let (repo, _) = local_repository();
        let folder = repo.create_folder(FolderDraft::new("Trip")).await.unwrap();
        let memory = repo
            .upload_memory(
                MemoryDraft::new("a.png", "image/png", 0).in_folder(Some(folder.id.clone())),
                vec![1],
            )
            .await
            .unwrap();

        let moved = repo.move_memory(&memory.id, Some("")).await.unwrap();

        assert_eq!(moved.folder_id, None);
        assert!(moved.updated_at >= memory.updated_at);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let (repo, _) = local_repository();
        assert!(matches!(repo.delete_memory("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(repo.delete_folder("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(
            repo.move_memory("nope", None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_filter_by_category_and_query() {
        let (repo, _) = local_repository();
        let mut draft = MemoryDraft::new("beach.png", "image/png", 0);
        draft.description = "Summer at the coast".to_string();
        repo.upload_memory(draft, vec![1]).await.unwrap();
        repo.upload_memory(MemoryDraft::new("notes.pdf", "application/pdf", 0), vec![1])
            .await
            .unwrap();

        let images = repo
            .list_memories(&MemoryFilter {
                category: MemoryCategory::Image,
                ..Default::default()
            })
            .await;
        assert_eq!(images.len(), 1);

        let coast = repo
            .list_memories(&MemoryFilter {
                query: Some("COAST".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(coast[0].name, "beach.png");

        let documents = repo
            .list_memories(&MemoryFilter {
                category: MemoryCategory::Document,
                ..Default::default()
            })
            .await;
        assert_eq!(documents[0].name, "notes.pdf");
    }

    #[tokio::test]
    async fn test_sync_is_inert_in_local_mode() {
        let (repo, _) = local_repository();
        assert!(!repo.sync_once().await.changed());
        assert!(repo.last_sync().await.is_none());
    }

    #[test]
    fn test_sync_outcome_summary() {
        let outcome = SyncOutcome {
            memories: MergeStats { added: 2, updated: 0 },
            folders: MergeStats::default(),
        };
        assert_eq!(outcome.summary().as_deref(), Some("2 new memories synced"));
        assert_eq!(SyncOutcome::default().summary(), None);
    }
}
