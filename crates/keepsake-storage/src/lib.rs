//! Local persistence for keepsake.
//!
//! Memories and folders are kept as two independently keyed JSON
//! collections, with a third key for the UI theme:
//!
//! ```text
//! data/
//!   memories.json   [ {...memory...}, ... ]
//!   folders.json    [ {...folder...}, ... ]
//!   theme.json      "dark"
//! ```
//!
//! Every save rewrites the whole collection. Reads never fail: a missing
//! or corrupt collection is logged and treated as empty, so a damaged
//! file can never keep the gallery from starting.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

mod error;

pub use error::{Error, Result};

/// Key holding the active theme name.
pub const THEME_KEY: &str = "theme";

/// The two record collections the gallery persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Memories,
    Folders,
}

impl CollectionKind {
    pub fn key(&self) -> &'static str {
        match self {
            CollectionKind::Memories => "memories",
            CollectionKind::Folders => "folders",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Raw string key-value storage underneath [`LocalStore`].
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

fn check_quota(quota: Option<u64>, needed: u64) -> Result<()> {
    match quota {
        Some(quota) if needed > quota => Err(Error::QuotaExceeded { needed, quota }),
        _ => Ok(()),
    }
}

/// One JSON file per key inside a directory.
pub struct DirectoryBackend {
    root: PathBuf,
    quota: Option<u64>,
}

impl DirectoryBackend {
    /// Open (and create if needed) a storage directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(path = %root.display(), "Local store directory ready");
        Ok(Self { root, quota: None })
    }

    /// Limit the total bytes stored across all keys.
    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = Some(quota);
        self
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Bytes used by every key except `skip`.
    fn used_bytes_except(&self, skip: &Path) -> Result<u64> {
        let mut total = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path == skip || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            total += entry.metadata()?.len();
        }
        Ok(total)
    }
}

impl KeyValueBackend for DirectoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.path_for(key);

        if self.quota.is_some() {
            let needed = self.used_bytes_except(&path)? + value.len() as u64;
            check_quota(self.quota, needed)?;
        }

        // Atomic write: temp file then rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, value)?;
        fs::rename(&temp_path, &path)?;

        debug!(key, bytes = value.len(), "Wrote local key");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local backend, used by tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<u64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = Some(quota);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| Error::Unavailable(format!("memory backend lock poisoned: {}", e)))
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let mut entries = self.lock()?;
        let others: u64 = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len() as u64)
            .sum();
        check_quota(self.quota, others + value.len() as u64)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Typed facade over a [`KeyValueBackend`].
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by a directory on disk.
    pub fn open(root: impl Into<PathBuf>, quota: Option<u64>) -> Result<Self> {
        let mut backend = DirectoryBackend::open(root)?;
        if let Some(quota) = quota {
            backend = backend.with_quota(quota);
        }
        Ok(Self::new(Arc::new(backend)))
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Read a persisted collection.
    ///
    /// Absent, unreadable or corrupt collections come back empty.
    pub fn load<T: DeserializeOwned>(&self, kind: CollectionKind) -> Vec<T> {
        let raw = match self.backend.get(kind.key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(collection = %kind, error = %e, "Failed to read local collection");
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(collection = %kind, error = %e, "Corrupt local collection, treating as empty");
                Vec::new()
            }
        }
    }

    /// Persist a full collection, replacing what was stored before.
    pub fn save<T: Serialize>(&self, kind: CollectionKind, records: &[T]) -> Result<()> {
        let raw = serde_json::to_string(records)?;
        self.backend.set(kind.key(), &raw)?;
        debug!(collection = %kind, count = records.len(), "Saved local collection");
        Ok(())
    }

    pub fn theme(&self) -> Option<String> {
        self.backend
            .get(THEME_KEY)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub fn set_theme(&self, theme: &str) -> Result<()> {
        let raw = serde_json::to_string(theme)?;
        self.backend.set(THEME_KEY, &raw)
    }

    /// Forget the stored theme so the default applies again.
    pub fn clear_theme(&self) -> Result<()> {
        self.backend.remove(THEME_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keepsake_models::{Folder, FolderDraft};

    fn folder(id: &str, name: &str) -> Folder {
        Folder::from_draft(id.to_string(), FolderDraft::new(name), Utc::now())
    }

    #[test]
    fn test_load_absent_collection_is_empty() {
        let store = LocalStore::in_memory();
        let folders: Vec<Folder> = store.load(CollectionKind::Folders);
        assert!(folders.is_empty());
    }

    #[test]
    fn test_save_then_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();

        store
            .save(CollectionKind::Folders, &[folder("f1", "Trip"), folder("f2", "Home")])
            .unwrap();

        // A fresh handle sees what the first one wrote.
        let reopened = LocalStore::open(dir.path(), None).unwrap();
        let folders: Vec<Folder> = reopened.load(CollectionKind::Folders);
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "Trip");
        assert!(dir.path().join("folders.json").exists());
        assert!(!dir.path().join("folders.tmp").exists());
    }

    #[test]
    fn test_corrupt_collection_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memories.json"), "{not json").unwrap();

        let store = LocalStore::open(dir.path(), None).unwrap();
        let memories: Vec<keepsake_models::Memory> = store.load(CollectionKind::Memories);
        assert!(memories.is_empty());
    }

    #[test]
    fn test_save_overwrites_previous_contents() {
        let store = LocalStore::in_memory();
        store
            .save(CollectionKind::Folders, &[folder("f1", "A"), folder("f2", "B")])
            .unwrap();
        store.save(CollectionKind::Folders, &[folder("f3", "C")]).unwrap();

        let folders: Vec<Folder> = store.load(CollectionKind::Folders);
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].id, "f3");
    }

    #[test]
    fn test_directory_quota_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), Some(64)).unwrap();

        let many: Vec<Folder> = (0..10).map(|i| folder(&format!("f{}", i), "x")).collect();
        let err = store.save(CollectionKind::Folders, &many).unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { quota: 64, .. }));

        // Nothing was written, previous state (none) still loads.
        let folders: Vec<Folder> = store.load(CollectionKind::Folders);
        assert!(folders.is_empty());
    }

    #[test]
    fn test_memory_backend_quota_counts_other_keys() {
        let backend = MemoryBackend::new().with_quota(10);
        backend.set("a", "12345").unwrap();
        backend.set("a", "1234567890").unwrap();
        assert!(matches!(
            backend.set("b", "1"),
            Err(Error::QuotaExceeded { needed: 11, quota: 10 })
        ));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let backend = MemoryBackend::new();
        assert!(matches!(backend.set("../x", "1"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_theme_key_is_separate() {
        let store = LocalStore::in_memory();
        assert_eq!(store.theme(), None);
        store.set_theme("dark").unwrap();
        assert_eq!(store.theme().as_deref(), Some("dark"));
        let folders: Vec<Folder> = store.load(CollectionKind::Folders);
        assert!(folders.is_empty());
    }

    #[test]
    fn test_clear_theme_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        store.set_theme("dark").unwrap();
        assert!(dir.path().join("theme.json").exists());

        store.clear_theme().unwrap();
        store.clear_theme().unwrap();

        assert_eq!(store.theme(), None);
        assert!(!dir.path().join("theme.json").exists());
    }
}
