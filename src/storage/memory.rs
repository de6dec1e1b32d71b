//! Volatile in-process uptime store.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

use super::{StorageError, UptimeStore};
use crate::uptime::{CheckResult, Uptime, UptimeWindow};

/// How long ingest-triggered cleanup keeps buckets. Matches the longest
/// supported query window, so no window ever loses data to cleanup.
const MAX_RETENTION_DAYS: i64 = 120;

/// Uptime store backed by a sharded in-process map, one aggregator per
/// endpoint.
///
/// The map's per-key locking serializes ingest and cleanup for the same
/// endpoint while leaving unrelated endpoints free to proceed in parallel.
/// Nothing is persisted; a restart starts from empty.
#[derive(Default)]
pub struct MemoryStore {
    endpoints: DashMap<String, Uptime>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UptimeStore for MemoryStore {
    fn ingest(&self, endpoint: &str, result: &CheckResult) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut uptime = self.endpoints.entry(endpoint.to_string()).or_default();
        uptime.record(result);
        uptime.cleanup_older_than(now - Duration::days(MAX_RETENTION_DAYS));
        uptime.refresh_snapshot(now);
        Ok(())
    }

    fn uptime_between(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, StorageError> {
        match self.endpoints.get(endpoint) {
            Some(uptime) => Ok(uptime.percentage_between(from, to)),
            None => Ok(100.0),
        }
    }

    fn average_response_time_between(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        match self.endpoints.get(endpoint) {
            Some(uptime) => Ok(uptime.average_response_time_between(from, to)),
            None => Ok(0),
        }
    }

    fn hourly_average_response_times(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<i64, u64>, StorageError> {
        match self.endpoints.get(endpoint) {
            Some(uptime) => Ok(uptime.hourly_average_response_times(from, to)),
            None => Ok(BTreeMap::new()),
        }
    }

    fn cleanup(&self, endpoint: &str, max_age: DateTime<Utc>) -> Result<(), StorageError> {
        if let Some(mut uptime) = self.endpoints.get_mut(endpoint) {
            uptime.cleanup_older_than(max_age);
            uptime.refresh_snapshot(Utc::now());
        }
        Ok(())
    }

    fn remove_endpoint(&self, endpoint: &str) -> Result<(), StorageError> {
        self.endpoints.remove(endpoint);
        Ok(())
    }

    fn endpoints(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.endpoints.iter().map(|entry| entry.key().clone()).collect())
    }

    fn uptime_for_window(&self, endpoint: &str, window: UptimeWindow) -> Result<f64, StorageError> {
        match self.endpoints.get(endpoint) {
            Some(uptime) => {
                // Fixed-day windows come straight from the snapshot computed
                // at last ingest; calendar windows are derived on demand.
                if let Some(pct) = uptime.snapshot().for_window(window) {
                    return Ok(pct);
                }
                let (from, to) = window.range(Utc::now());
                Ok(uptime.percentage_between(from, to))
            }
            None => Ok(100.0),
        }
    }
}
