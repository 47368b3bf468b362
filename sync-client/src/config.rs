//! Configuration loading for bucketsync sessions.
//!
//! Configuration is loaded from a TOML file. Every section and field is
//! optional; missing values fall back to the defaults below.

use bucketsync_core::BucketOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration for a session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Session identity.
    #[serde(default)]
    pub session: SessionSection,
    /// Options applied to every bucket the session creates.
    #[serde(default)]
    pub buckets: BucketOptions,
    /// Storage backend selection.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session identity.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// Application id the buckets sync under (default: "bucketsync").
    #[serde(default = "default_app_id")]
    pub app_id: String,
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Directory for bucket snapshot files. In-memory storage when absent.
    pub path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive (default: "info"). `RUST_LOG` overrides it.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_app_id() -> String {
    "bucketsync".to_string()
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
