//! Configuration types for ledgersync.
//!
//! Configuration is loaded from a TOML file. Only the database path is
//! required; every other setting has a default.
//!
//! # Example Configuration (TOML)
//!
//! ```toml
//! [database]
//! path = "ledger.db"
//!
//! [sync]
//! max_diff_threshold = 250000
//! batch_size = 100000
//! check_local_nodes = true
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```
//!
//! # Loading Configuration
//!
//! ```rust,no_run
//! use ledgersync_common::Config;
//! use std::path::Path;
//!
//! let config = Config::from_file(Path::new("ledgersync.toml")).unwrap();
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Log levels for filtering log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration (storage path).
    pub database: DatabaseConfig,

    /// Catch-up and import tuning.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration (level and format).
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    ///
    /// The parent directory is created if it does not exist.
    pub path: PathBuf,
}

/// Synchronization tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Largest delta applied incrementally. A diff that would exceed it is
    /// abandoned and the target is imported in full instead.
    #[serde(default = "default_max_diff_threshold")]
    pub max_diff_threshold: usize,

    /// Number of rows written between checkpoints of a long catch-up.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Refuse to catch up to a tree that reports missing nodes.
    #[serde(default = "default_true")]
    pub check_local_nodes: bool,
}

fn default_max_diff_threshold() -> usize {
    250_000
}

fn default_batch_size() -> usize {
    100_000
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_diff_threshold: default_max_diff_threshold(),
            batch_size: default_batch_size(),
            check_local_nodes: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

impl Config {
    /// Creates a configuration with default settings for the given database.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig { path: path.into() },
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Loads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(Error::Config("database.path must not be empty".to_string()));
        }
        if self.sync.batch_size == 0 {
            return Err(Error::Config("sync.batch_size must be positive".to_string()));
        }
        if self.sync.max_diff_threshold == 0 {
            return Err(Error::Config(
                "sync.max_diff_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str("[database]\npath = \"ledger.db\"\n").unwrap();
        assert_eq!(config.database.path, PathBuf::from("ledger.db"));
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.sync.max_diff_threshold, 250_000);
        assert_eq!(config.sync.batch_size, 100_000);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            [database]
            path = "/var/lib/ledgersync/ledger.db"

            [sync]
            max_diff_threshold = 1000
            batch_size = 50
            check_local_nodes = false

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.max_diff_threshold, 1000);
        assert_eq!(config.sync.batch_size, 50);
        assert!(!config.sync.check_local_nodes);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = Config::from_toml_str("[database]\npath = \"x.db\"\n[sync]\nbatch_size = 0\n");
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_database_rejected() {
        assert!(Config::from_toml_str("[sync]\nbatch_size = 10\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledgersync.toml");
        std::fs::write(&path, "[database]\npath = \"ledger.db\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("ledger.db"));
    }
}
