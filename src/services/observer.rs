//! Callbacks from the core to the presentation layer.
//!
//! The repository never renders anything itself. After every successful
//! mutation it hands the current collections to the observer; backend
//! transitions and sync outcomes arrive as status events, and user-facing
//! messages (validation failures, fallbacks) as notices.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use keepsake_models::{Folder, Memory};
use serde::Serialize;

/// Backend state as shown in the status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusState {
    Ready,
    CloudConnected,
    Error,
}

impl StatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusState::Ready => "ready",
            StatusState::CloudConnected => "cloud-connected",
            StatusState::Error => "error",
        }
    }
}

impl std::fmt::Display for StatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub state: StatusState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(state: StatusState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A message meant for the user's notification area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Receiver of render, status and notice callbacks.
///
/// All methods default to no-ops so collaborators implement only what
/// they display.
pub trait RepositoryObserver: Send + Sync {
    /// Called after any successful mutation with the current collections.
    fn on_render(&self, _memories: &[Memory], _folders: &[Folder]) {}

    fn on_status(&self, _event: &StatusEvent) {}

    fn on_notice(&self, _notice: &Notice) {}
}

/// Remembers the latest status event and recent notices, for polling
/// clients such as the HTTP status endpoint.
pub struct StatusTracker {
    last_status: RwLock<Option<StatusEvent>>,
    notices: RwLock<Vec<Notice>>,
    max_notices: usize,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            last_status: RwLock::new(None),
            notices: RwLock::new(Vec::new()),
            max_notices: 50,
        }
    }

    pub fn last_status(&self) -> Option<StatusEvent> {
        self.last_status.read().ok().and_then(|s| s.clone())
    }

    /// Most recent notices, newest last.
    pub fn recent_notices(&self) -> Vec<Notice> {
        self.notices.read().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryObserver for StatusTracker {
    fn on_status(&self, event: &StatusEvent) {
        if let Ok(mut last) = self.last_status.write() {
            *last = Some(event.clone());
        }
    }

    fn on_notice(&self, notice: &Notice) {
        if let Ok(mut notices) = self.notices.write() {
            notices.push(notice.clone());
            let overflow = notices.len().saturating_sub(self.max_notices);
            if overflow > 0 {
                notices.drain(..overflow);
            }
        }
    }
}
