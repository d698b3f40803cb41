/// Engine configuration.
/// Reads board.json from ~/.config/lexera/board.json (or platform equivalent).
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::order::key::DEFAULT_MAX_KEY_LEN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Upper bound on one persist round-trip; expiry counts as a failure.
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
    /// Keys longer than this trigger a reflow of the collection.
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,
    /// Oldest notifications are dropped beyond this many.
    #[serde(default = "default_notification_limit")]
    pub notification_limit: usize,
    /// Age after which a notification is expired.
    #[serde(default = "default_notification_ttl_ms")]
    pub notification_ttl_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_persist_timeout_ms() -> u64 {
    10_000
}

fn default_max_key_length() -> usize {
    DEFAULT_MAX_KEY_LEN
}

fn default_notification_limit() -> usize {
    5
}

fn default_notification_ttl_ms() -> u64 {
    8_000
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_timeout_ms: default_persist_timeout_ms(),
            max_key_length: default_max_key_length(),
            notification_limit: default_notification_limit(),
            notification_ttl_ms: default_notification_ttl_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }

    /// Clamp values the engine cannot work with.
    fn sanitized(mut self) -> Self {
        // "V" plus one refinement digit is the shortest usable key space
        if self.max_key_length < 2 {
            log::warn!(
                "[lexera.board.config] maxKeyLength {} too small, using {}",
                self.max_key_length,
                DEFAULT_MAX_KEY_LEN
            );
            self.max_key_length = DEFAULT_MAX_KEY_LEN;
        }
        if self.event_capacity == 0 {
            self.event_capacity = default_event_capacity();
        }
        if self.persist_timeout_ms == 0 {
            self.persist_timeout_ms = default_persist_timeout_ms();
        }
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Default config path: ~/.config/lexera/board.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lexera")
        .join("board.json")
}

/// Strict load: missing or malformed files are errors.
pub fn try_load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: EngineConfig = serde_json::from_str(&content)?;
    Ok(config.sanitized())
}

/// Load config from path. Returns default if the file doesn't exist or
/// cannot be parsed.
pub fn load_config(path: &Path) -> EngineConfig {
    match try_load_config(path) {
        Ok(config) => config,
        Err(ConfigError::Io(_)) => {
            log::info!(
                "[lexera.board.config] No config at {}, using defaults",
                path.display()
            );
            EngineConfig::default()
        }
        Err(ConfigError::Parse(e)) => {
            log::warn!(
                "[lexera.board.config] Failed to parse config {}: {}",
                path.display(),
                e
            );
            EngineConfig::default()
        }
    }
}
