//! Configuration module for uptrack.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),
}

/// Which backend holds the uptime buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// In-process map, lost on restart.
    Memory,
    /// SQLite database file.
    Sqlite,
}

impl Default for StorageKind {
    fn default() -> Self {
        Self::Memory
    }
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend kind (default: memory)
    pub kind: StorageKind,
    /// Path to the SQLite database file, required for the sqlite backend
    pub path: String,
    /// Whether window queries go through the write-through cache
    /// (default: false)
    pub caching: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Memory,
            path: String::new(),
            caching: false,
        }
    }
}

impl StorageConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTRACK_STORAGE_KIND`: "memory" or "sqlite" (default: "memory")
    /// - `UPTRACK_DB_PATH`: database file path for the sqlite backend
    /// - `UPTRACK_WRITE_THROUGH_CACHE`: "true" to cache window queries
    ///   (default: "false")
    ///
    /// An unrecognized backend kind is an error rather than a silent
    /// fallback, since falling back to the volatile backend would discard
    /// data on restart.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(kind) = env::var("UPTRACK_STORAGE_KIND") {
            cfg.kind = kind.parse()?;
        }

        if let Ok(path) = env::var("UPTRACK_DB_PATH") {
            cfg.path = path;
        }

        if let Ok(caching) = env::var("UPTRACK_WRITE_THROUGH_CACHE") {
            if let Ok(caching) = caching.parse() {
                cfg.caching = caching;
            }
        }

        Ok(cfg)
    }

    /// Configuration for the volatile in-process backend.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Configuration for the SQLite backend at `path`.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            kind: StorageKind::Sqlite,
            path: path.into(),
            caching: false,
        }
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }
}
