//! Application state for API handlers

use std::sync::Arc;
use std::time::Duration;
use tandem_core::Coordinator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The coordinator every handler talks to
    pub coordinator: Arc<Coordinator>,

    /// Longest a single long-poll request may block
    pub max_wait: Duration,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(coordinator: Arc<Coordinator>, max_wait: Duration) -> Self {
        Self {
            coordinator,
            max_wait,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Clamp a client-requested wait to the server limit.
    pub fn wait_limit(&self, timeout_ms: Option<u64>) -> Duration {
        match timeout_ms {
            Some(ms) => Duration::from_millis(ms).min(self.max_wait),
            None => self.max_wait,
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
