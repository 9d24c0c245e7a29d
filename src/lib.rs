//! Keepsake - local-first memory gallery store.
//!
//! Memories (uploaded files) and folders live in a cloud backend when one
//! is configured and reachable, with a local store as fallback and mirror.
//! A reconciler keeps the in-memory view in step with the cloud.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
