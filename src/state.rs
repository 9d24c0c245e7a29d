//! Application state for keepsake.
//!
//! Contains the shared state that is passed to all handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::services::{MemoryRepository, StatusTracker};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Memory/folder repository.
    pub repository: MemoryRepository,
    /// Latest status event and notices, as seen by the repository observer.
    pub status: Arc<StatusTracker>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(repository: MemoryRepository, status: Arc<StatusTracker>) -> Self {
        Self {
            repository,
            status,
            started_at: Instant::now(),
        }
    }
}
