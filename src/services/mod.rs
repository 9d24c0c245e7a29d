//! Service layer for keepsake.
//!
//! - Cloud (remote tables + blob bucket behind the `CloudStore` trait)
//! - Backend (one-time cloud/local selection)
//! - Repository (cache owner and write router with local fallback)
//! - Reconciler (periodic last-write-wins pull)
//! - Observer (render/status/notice callbacks)
//! - Validation (upload and folder input checks)

pub mod backend;
pub mod cloud;
pub mod observer;
pub mod reconciler;
pub mod repository;
pub mod validation;

pub use backend::{select_backend, select_with_store, BackendMode};
pub use cloud::{CloudStore, FolderRow, MemoryPatch, MemoryRow, SupabaseStore};
pub use observer::{
    Notice, NoticeLevel, RepositoryObserver, StatusEvent, StatusState, StatusTracker,
};
pub use reconciler::{merge_records, MergeStats, Reconciler, ReconcilerHandle};
pub use repository::{MemoryFilter, MemoryRepository, Snapshot, SyncOutcome};
