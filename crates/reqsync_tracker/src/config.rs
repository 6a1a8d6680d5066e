//! Tracker configuration.

use reqsync_core::Config;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the rescheduler behind edit sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Debounce window in milliseconds, measured from the first schedule
    /// call of a window.
    pub debounce_ms: u64,
    /// Name of the rescheduler's worker thread.
    pub thread_name: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for TrackerConfig {
    fn from(config: &Config) -> Self {
        Self {
            debounce_ms: config.debounce_ms,
            thread_name: "reqsync-rescheduler".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Sets the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The debounce window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
