//! Engine-wide defaults.
//!
//! Loaded from `settings.toml` in the app data directory when present; every
//! field falls back to its default when missing.

use crate::config::settings_path;
use crate::error::{GraphError, Result};
use crate::graph::events::DEFAULT_EVENT_CAPACITY;
use crate::thread::{LoopMode, LoopSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_interval_ms() -> u64 {
    10
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Runtime defaults for graphs built from files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Loop interval for looped triggers that do not set one
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,

    /// Loop mode for looped triggers that do not set one
    #[serde(default)]
    pub default_mode: LoopMode,

    /// How long the runner waits for a loop to stop
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Queue length of each event subscription
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
            default_mode: LoopMode::default(),
            stop_timeout_ms: default_stop_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineSettings {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Loop settings for a trigger without explicit timing.
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings::with_interval(self.default_interval()).mode(self.default_mode)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GraphError::Config(format!("Failed to parse settings: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::Config(format!("Failed to read settings file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Settings from the app data directory, or defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring settings file: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| GraphError::Config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            GraphError::Config(format!("Failed to write settings file {:?}: {}", path, e))
        })
    }
}
