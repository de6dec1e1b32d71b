//! Storage backends for uptime statistics.
//!
//! Two structurally different backends with equivalent semantics sit behind
//! the `UptimeStore` trait: a volatile in-process map and a SQLite store.
//! The write-through cache is a decorator over either one, never a backend
//! of its own.

mod cache;
mod memory;
mod sql;

pub use cache::*;
pub use memory::*;
pub use sql::*;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigError, StorageConfig, StorageKind};
use crate::uptime::{CheckResult, UptimeSnapshot, UptimeWindow};

/// Storage error types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database path cannot be empty")]
    PathNotSpecified,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A store of per-endpoint hourly uptime buckets.
///
/// All bucket mutation goes through `ingest` and the cleanup entry points;
/// queries never write. Implementations are safe to share across concurrent
/// check-executor tasks, and ingests for distinct endpoints do not block
/// each other beyond what the backing connection imposes.
pub trait UptimeStore: Send + Sync {
    /// Fold one check result into the endpoint's bucket for that hour.
    ///
    /// Counter updates for the same `(endpoint, hour)` key are atomic under
    /// concurrent callers; retrying a failed ingest is safe, but re-ingesting
    /// a result that was already applied double-counts it.
    fn ingest(&self, endpoint: &str, result: &CheckResult) -> Result<(), StorageError>;

    /// Uptime percentage over `[from, to]`, both bounds inclusive.
    /// A range without data reads as `100.0`.
    fn uptime_between(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, StorageError>;

    /// Average response time in milliseconds over `[from, to]`, `0` when the
    /// range holds no executions.
    fn average_response_time_between(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Per-hour average response times over `[from, to]`, keyed by hour
    /// timestamp, for latency charts.
    fn hourly_average_response_times(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<i64, u64>, StorageError>;

    /// Enforce retention for one endpoint: delete buckets past the backend's
    /// cleanup boundary for `max_age`, the oldest instant the caller wants
    /// to keep. Callable independently of ingest.
    fn cleanup(&self, endpoint: &str, max_age: DateTime<Utc>) -> Result<(), StorageError>;

    /// Drop every bucket of a decommissioned endpoint.
    fn remove_endpoint(&self, endpoint: &str) -> Result<(), StorageError>;

    /// Endpoint keys currently holding buckets.
    fn endpoints(&self) -> Result<Vec<String>, StorageError>;

    /// Uptime percentage for a named window ending now.
    fn uptime_for_window(&self, endpoint: &str, window: UptimeWindow) -> Result<f64, StorageError> {
        let (from, to) = window.range(Utc::now());
        self.uptime_between(endpoint, from, to)
    }

    /// Average response time for a named window ending now.
    fn average_response_time_for_window(
        &self,
        endpoint: &str,
        window: UptimeWindow,
    ) -> Result<u64, StorageError> {
        let (from, to) = window.range(Utc::now());
        self.average_response_time_between(endpoint, from, to)
    }

    /// All fixed-window percentages for one endpoint.
    fn snapshot(&self, endpoint: &str) -> Result<UptimeSnapshot, StorageError> {
        Ok(UptimeSnapshot {
            seven_days: self.uptime_for_window(endpoint, UptimeWindow::SevenDays)?,
            thirty_days: self.uptime_for_window(endpoint, UptimeWindow::ThirtyDays)?,
            sixty_days: self.uptime_for_window(endpoint, UptimeWindow::SixtyDays)?,
            ninety_days: self.uptime_for_window(endpoint, UptimeWindow::NinetyDays)?,
            one_hundred_twenty_days: self
                .uptime_for_window(endpoint, UptimeWindow::OneHundredTwentyDays)?,
        })
    }
}

/// Build the store described by `config`, wrapping it in the write-through
/// cache when caching is enabled.
///
/// Configuration problems surface here, before any state is created.
pub fn new_store(config: &StorageConfig) -> Result<Arc<dyn UptimeStore>, StorageError> {
    match config.kind {
        StorageKind::Memory => {
            let store = MemoryStore::new();
            Ok(wrap(store, config.caching))
        }
        StorageKind::Sqlite => {
            if config.path.is_empty() {
                return Err(StorageError::PathNotSpecified);
            }
            let store = SqlStore::open(&config.path)?;
            Ok(wrap(store, config.caching))
        }
    }
}

fn wrap<S: UptimeStore + 'static>(store: S, caching: bool) -> Arc<dyn UptimeStore> {
    if caching {
        Arc::new(CachedStore::new(store))
    } else {
        Arc::new(store)
    }
}
