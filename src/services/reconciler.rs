//! Periodic pull-and-merge of remote state into the repository cache.
//!
//! The merge is additive: records missing from a fetch stay where they
//! are. Ticks are spawned independently, so a slow tick can overlap the
//! next one; both merge by id and converge on the newest timestamp.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keepsake_models::Record;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::repository::MemoryRepository;

/// Counts produced by one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0
    }
}

/// Merge `remote` into `local` with last-write-wins.
///
/// Unknown ids are prepended, keeping the remote order. Known ids are
/// overwritten in place only when the remote copy is strictly newer.
/// Nothing is ever removed from `local`.
pub fn merge_records<T: Record>(local: &mut Vec<T>, remote: Vec<T>) -> MergeStats {
    let index: HashMap<String, usize> = local
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id().to_string(), i))
        .collect();

    let mut stats = MergeStats::default();
    let mut fresh: Vec<T> = Vec::new();
    let mut fresh_ids: HashSet<String> = HashSet::new();

    for record in remote {
        match index.get(record.id()) {
            Some(&i) => {
                if record.updated_at() > local[i].updated_at() {
                    local[i] = record;
                    stats.updated += 1;
                }
            }
            // Duplicate ids within one fetch resolve to the first seen.
            None if fresh_ids.insert(record.id().to_string()) => fresh.push(record),
            None => {}
        }
    }

    stats.added = fresh.len();
    if !fresh.is_empty() {
        fresh.append(local);
        *local = fresh;
    }
    stats
}

/// Periodic reconciler bound to a repository.
pub struct Reconciler {
    repository: MemoryRepository,
    interval: Duration,
}

impl Reconciler {
    pub fn new(repository: MemoryRepository, interval: Duration) -> Self {
        Self {
            repository,
            interval,
        }
    }

    /// Start ticking in the background.
    ///
    /// Inert when the repository runs in local mode: the loop is not even
    /// spawned.
    pub fn start(self) -> ReconcilerHandle {
        let running = Arc::new(AtomicBool::new(true));

        if !self.repository.mode().is_cloud() {
            debug!("Local mode, reconciler not started");
            running.store(false, Ordering::SeqCst);
            return ReconcilerHandle {
                running,
                handle: None,
            };
        }

        let running_clone = running.clone();
        let repository = self.repository;
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "Reconciler started");

            let mut ticker = tokio::time::interval(interval);
            // First tick of a tokio interval fires immediately; the startup
            // load already merged remote state.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !running_clone.load(Ordering::SeqCst) {
                    break;
                }

                let repository = repository.clone();
                tokio::spawn(async move {
                    repository.sync_once().await;
                });
            }

            info!("Reconciler stopped");
        });

        ReconcilerHandle {
            running,
            handle: Some(handle),
        }
    }
}

/// Handle to stop the reconciler timer.
///
/// Stopping prevents further ticks; a tick already in flight runs to
/// completion.
pub struct ReconcilerHandle {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    pub async fn join(self) {
        if let Some(handle) = self.handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Reconciler task failed");
                }
            }
        }
    }
}
