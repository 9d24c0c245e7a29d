//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keepsake::config::UploadConfig;
use keepsake::services::{
    BackendMode, CloudStore, FolderRow, MemoryPatch, MemoryRepository, MemoryRow,
    RepositoryObserver, StatusEvent, StatusTracker, Notice,
};
use keepsake::{Error, Result};
use keepsake_models::{Folder, Memory, MemoryDraft};
use keepsake_storage::LocalStore;

/// Individual cloud operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Probe,
    InsertMemory,
    InsertFolder,
    UpdateMemory,
    DeleteMemory,
    DeleteFolderMemories,
    DeleteFolder,
    FetchMemories,
    FetchFolders,
    UploadBlob,
    BlobUrl,
    RemoveBlob,
}

const ALL_OPS: [Op; 12] = [
    Op::Probe,
    Op::InsertMemory,
    Op::InsertFolder,
    Op::UpdateMemory,
    Op::DeleteMemory,
    Op::DeleteFolderMemories,
    Op::DeleteFolder,
    Op::FetchMemories,
    Op::FetchFolders,
    Op::UploadBlob,
    Op::BlobUrl,
    Op::RemoveBlob,
];

/// In-memory cloud store with per-operation failure switches.
#[derive(Default)]
pub struct FakeCloudStore {
    memories: Mutex<Vec<Memory>>,
    folders: Mutex<Vec<Folder>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<Op>>,
    calls: Mutex<Vec<Op>>,
    next_id: AtomicU64,
}

impl FakeCloudStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn fail_all(&self) {
        self.failing.lock().unwrap().extend(ALL_OPS);
    }

    pub fn heal(&self, op: Op) {
        self.failing.lock().unwrap().remove(&op);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn memories(&self) -> Vec<Memory> {
        self.memories.lock().unwrap().clone()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.folders.lock().unwrap().clone()
    }

    pub fn blob_paths(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    /// Put a record on the "server" directly, as another client would.
    pub fn seed_memory(&self, memory: Memory) {
        self.memories.lock().unwrap().insert(0, memory);
    }

    pub fn seed_folder(&self, folder: Folder) {
        self.folders.lock().unwrap().insert(0, folder);
    }

    fn enter(&self, op: Op) -> Result<()> {
        self.calls.lock().unwrap().push(op);
        if self.failing.lock().unwrap().contains(&op) {
            Err(Error::Cloud(format!("{:?} failed", op)))
        } else {
            Ok(())
        }
    }

    fn next_id(&self) -> String {
        format!("cloud-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl CloudStore for FakeCloudStore {
    async fn probe(&self) -> Result<()> {
        self.enter(Op::Probe)
    }

    async fn insert_memory(&self, row: &MemoryRow) -> Result<Memory> {
        self.enter(Op::InsertMemory)?;
        let mut row = row.clone();
        row.id = Some(self.next_id());
        let memory = row.into_memory()?;
        self.memories.lock().unwrap().insert(0, memory.clone());
        Ok(memory)
    }

    async fn insert_folder(&self, row: &FolderRow) -> Result<Folder> {
        self.enter(Op::InsertFolder)?;
        let mut row = row.clone();
        row.id = Some(self.next_id());
        let folder = row.into_folder()?;
        self.folders.lock().unwrap().insert(0, folder.clone());
        Ok(folder)
    }

    async fn update_memory(&self, id: &str, patch: &MemoryPatch) -> Result<Memory> {
        self.enter(Op::UpdateMemory)?;
        let mut memories = self.memories.lock().unwrap();
        let memory = memories
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(format!("remote memory {}", id)))?;
        memory.folder_id = patch.folder_id.clone();
        memory.updated_at = patch.updated_at;
        Ok(memory.clone())
    }

    async fn delete_memory_record(&self, id: &str) -> Result<()> {
        self.enter(Op::DeleteMemory)?;
        self.memories.lock().unwrap().retain(|m| m.id != id);
        Ok(())
    }

    async fn delete_folder_memories(&self, folder_id: &str) -> Result<()> {
        self.enter(Op::DeleteFolderMemories)?;
        self.memories
            .lock()
            .unwrap()
            .retain(|m| m.folder_id.as_deref() != Some(folder_id));
        Ok(())
    }

    async fn delete_folder_record(&self, id: &str) -> Result<()> {
        self.enter(Op::DeleteFolder)?;
        self.folders.lock().unwrap().retain(|f| f.id != id);
        Ok(())
    }

    async fn fetch_memories(&self) -> Result<Vec<Memory>> {
        self.enter(Op::FetchMemories)?;
        let mut memories = self.memories();
        memories.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(memories)
    }

    async fn fetch_folders(&self) -> Result<Vec<Folder>> {
        self.enter(Op::FetchFolders)?;
        let mut folders = self.folders();
        folders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(folders)
    }

    async fn upload_blob(
        &self,
        object_name: &str,
        bytes: Vec<u8>,
        _mime_type: &str,
    ) -> Result<String> {
        self.enter(Op::UploadBlob)?;
        self.blobs
            .lock()
            .unwrap()
            .insert(object_name.to_string(), bytes);
        Ok(object_name.to_string())
    }

    async fn blob_url(&self, storage_path: &str) -> Result<String> {
        self.enter(Op::BlobUrl)?;
        Ok(format!("https://blobs.test/{}", storage_path))
    }

    async fn remove_blob(&self, storage_path: &str) -> Result<()> {
        self.enter(Op::RemoveBlob)?;
        self.blobs.lock().unwrap().remove(storage_path);
        Ok(())
    }
}

/// Observer counting render callbacks, forwarding status and notices to a
/// tracker.
#[derive(Default)]
pub struct RecordingObserver {
    pub renders: AtomicUsize,
    pub tracker: StatusTracker,
}

impl RecordingObserver {
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl RepositoryObserver for RecordingObserver {
    fn on_render(&self, _memories: &[Memory], _folders: &[Folder]) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }

    fn on_status(&self, event: &StatusEvent) {
        self.tracker.on_status(event);
    }

    fn on_notice(&self, notice: &Notice) {
        self.tracker.on_notice(notice);
    }
}

pub fn cloud_repository(
    store: Arc<FakeCloudStore>,
    local: LocalStore,
) -> (MemoryRepository, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let repository = MemoryRepository::new(
        BackendMode::Cloud(store),
        local,
        observer.clone(),
        UploadConfig::default(),
    );
    (repository, observer)
}

pub fn local_repository(local: LocalStore) -> (MemoryRepository, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let repository = MemoryRepository::new(
        BackendMode::Local,
        local,
        observer.clone(),
        UploadConfig::default(),
    );
    (repository, observer)
}

pub fn png(name: &str) -> MemoryDraft {
    MemoryDraft::new(name, "image/png", 0)
}

pub fn bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
