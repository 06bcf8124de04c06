//! Store and working-copy configuration
//!
//! Both halves deserialize from JSON with per-field defaults, so a config
//! file only needs the keys it overrides:
//!
//! ```json
//! { "store": { "data_dir": "/var/lib/coreobject", "sync_writes": true },
//!   "context": { "author": "alice" } }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event, Severity};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration for the store and its durable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root data directory. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// fsync after every transaction batch.
    pub sync_writes: bool,
    /// Number of materialized item graphs kept per store.
    pub snapshot_cache_capacity: usize,
    /// Minimum severity emitted by the logger.
    pub log_level: Severity,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_writes: true,
            snapshot_cache_capacity: 64,
            log_level: Severity::Info,
        }
    }
}

impl StoreConfig {
    /// In-memory store configuration.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed store configuration rooted at `data_dir`.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Whether this configuration persists to disk.
    pub fn is_persistent(&self) -> bool {
        self.data_dir.is_some()
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.snapshot_cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for an editing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Upper bound on the revision number loaded by this context.
    /// `None` means no limit (always load branch tips).
    pub max_revision_number: Option<u64>,
    /// Name given to the first branch of persistent roots created by the context.
    pub default_branch_name: String,
    /// Author recorded in commit metadata.
    pub author: Option<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_revision_number: None,
            default_branch_name: "main".to_string(),
            author: None,
        }
    }
}

impl ContextConfig {
    /// Context configuration pinned at `max_revision_number`.
    pub fn pinned(max_revision_number: u64) -> Self {
        Self {
            max_revision_number: Some(max_revision_number),
            ..Self::default()
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.default_branch_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_branch_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store section
    pub store: StoreConfig,
    /// Editing context section
    pub context: ContextConfig,
}

impl Config {
    /// Loads and validates a JSON configuration file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&content).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;

        log_event_with_fields(Event::ConfigLoaded, &[("path", &path.display().to_string())]);
        Ok(config)
    }

    /// Parses and validates a JSON configuration string.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })?;
        config.store.validate()?;
        config.context.validate()?;
        Ok(config)
    }
}
