//! Store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Local model version stamped on newly created entities.
pub const MODEL_VERSION: u32 = 1;

/// Configuration for a store and the edit sessions opened on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Model version written into `version` of new entities.
    pub version: u32,

    /// Debounce window for dirty-state checks, in milliseconds.
    pub debounce_ms: u64,

    /// Whether new projects receive the five default request methods.
    pub create_default_methods: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: MODEL_VERSION,
            debounce_ms: 300,
            create_default_methods: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the debounce window.
    #[must_use]
    pub fn debounce(mut self, interval: Duration) -> Self {
        self.debounce_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets whether default methods are generated for new projects.
    #[must_use]
    pub const fn create_default_methods(mut self, value: bool) -> Self {
        self.create_default_methods = value;
        self
    }

    /// Returns the debounce window as a duration.
    #[must_use]
    pub const fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
