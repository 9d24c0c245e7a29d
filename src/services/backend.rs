//! Backend selection.
//!
//! The mode is decided once at startup. A missing or placeholder cloud
//! configuration, or a failed connectivity probe, selects `Local` for the
//! rest of the process; nothing promotes it back to `Cloud` later.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::CloudConfig;
use crate::services::cloud::{CloudStore, SupabaseStore};
use crate::services::observer::{RepositoryObserver, StatusEvent, StatusState};

/// Where writes go first.
#[derive(Clone)]
pub enum BackendMode {
    Cloud(Arc<dyn CloudStore>),
    Local,
}

impl BackendMode {
    pub fn is_cloud(&self) -> bool {
        matches!(self, BackendMode::Cloud(_))
    }

    pub fn cloud(&self) -> Option<&Arc<dyn CloudStore>> {
        match self {
            BackendMode::Cloud(store) => Some(store),
            BackendMode::Local => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Cloud(_) => "cloud",
            BackendMode::Local => "local",
        }
    }
}

impl fmt::Debug for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the backend from configuration, probing the cloud if it looks
/// configured.
pub async fn select_backend(
    config: &CloudConfig,
    observer: &dyn RepositoryObserver,
) -> BackendMode {
    if !config.is_configured() {
        info!("Cloud store not configured, using local storage");
        observer.on_status(&StatusEvent::new(
            StatusState::Ready,
            "Using local storage",
        ));
        return BackendMode::Local;
    }

    let store = match SupabaseStore::new(config) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Failed to build cloud client, using local storage");
            observer.on_status(&StatusEvent::new(
                StatusState::Error,
                "Cloud unavailable, using local storage",
            ));
            return BackendMode::Local;
        }
    };

    select_with_store(Arc::new(store), observer).await
}

/// Probe an already constructed store and settle the mode.
pub async fn select_with_store(
    store: Arc<dyn CloudStore>,
    observer: &dyn RepositoryObserver,
) -> BackendMode {
    match store.probe().await {
        Ok(()) => {
            info!("Cloud store connected");
            observer.on_status(&StatusEvent::new(
                StatusState::CloudConnected,
                "Connected to cloud storage",
            ));
            BackendMode::Cloud(store)
        }
        Err(e) => {
            warn!(error = %e, "Cloud probe failed, using local storage");
            observer.on_status(&StatusEvent::new(
                StatusState::Error,
                "Cloud unavailable, using local storage",
            ));
            BackendMode::Local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PLACEHOLDER_CREDENTIAL;
    use crate::services::observer::StatusTracker;

    #[tokio::test]
    async fn test_placeholder_config_selects_local() {
        let tracker = StatusTracker::new();
        let config = CloudConfig::new("https://abc.supabase.co", PLACEHOLDER_CREDENTIAL);

        let mode = select_backend(&config, &tracker).await;

        assert!(!mode.is_cloud());
        assert_eq!(tracker.last_status().unwrap().state, StatusState::Ready);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_selects_local() {
        let tracker = StatusTracker::new();
        // Nothing listens on port 1.
        let config = CloudConfig::new("http://127.0.0.1:1", "real-key");

        let mode = select_backend(&config, &tracker).await;

        assert_eq!(mode.as_str(), "local");
        assert_eq!(tracker.last_status().unwrap().state, StatusState::Error);
    }
}
