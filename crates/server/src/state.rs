// crates/server/src/state.rs
//! Application state for the Axum server.

use crate::live::hub::BroadcastHub;
use co11y_core::stats_cache_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Aggregation and broadcast hub. Also knows the projects root.
    pub hub: Arc<BroadcastHub>,
}

impl AppState {
    /// Wrap an already constructed hub. Starting it is the caller's job.
    pub fn new(hub: Arc<BroadcastHub>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            hub,
        })
    }

    pub fn projects_dir(&self) -> &Path {
        self.hub.projects_dir()
    }

    /// Stats cache next to the projects root.
    pub fn stats_path(&self) -> PathBuf {
        stats_cache_path(self.projects_dir())
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
