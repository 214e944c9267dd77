//! Engine timing and capacity settings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Playback pacing and backlog size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between revealed characters.
    pub typing_interval: Duration,
    /// Delay before auto-play advances a fully shown node.
    pub auto_play_interval: Duration,
    /// Maximum backlog entries kept.
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            typing_interval: Duration::from_millis(100),
            auto_play_interval: Duration::from_secs(3),
            history_capacity: 100,
        }
    }
}

/// On-disk form. Durations are whole milliseconds; missing fields take the
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    typing_interval_ms: u64,
    auto_play_interval_ms: u64,
    history_capacity: usize,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            typing_interval_ms: config.typing_interval.as_millis() as u64,
            auto_play_interval_ms: config.auto_play_interval.as_millis() as u64,
            history_capacity: config.history_capacity,
        }
    }
}

impl From<ConfigFile> for EngineConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            typing_interval: Duration::from_millis(file.typing_interval_ms),
            auto_play_interval: Duration::from_millis(file.auto_play_interval_ms),
            history_capacity: file.history_capacity,
        }
    }
}

impl EngineConfig {
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let file: ConfigFile = ron::from_str(input)?;
        Ok(file.into())
    }

    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn with_typing_interval(mut self, interval: Duration) -> Self {
        self.typing_interval = interval;
        self
    }

    pub fn with_auto_play_interval(mut self, interval: Duration) -> Self {
        self.auto_play_interval = interval;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}
