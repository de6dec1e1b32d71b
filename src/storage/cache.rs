//! Write-through cache over an uptime store.
//!
//! Only window-keyed queries are cached; arbitrary-range queries carry
//! bounds that rarely repeat, so they always pass through. Ingest refreshes
//! the live entries of the affected endpoint instead of dropping them, so a
//! read right after a write is a warm hit that already reflects the write.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::{StorageError, UptimeStore};
use crate::uptime::{CheckResult, UptimeSnapshot, UptimeWindow};

/// How long a cached statistic may be served before it is recomputed.
const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum QueryKind {
    Uptime,
    ResponseTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    endpoint: String,
    kind: QueryKind,
    window: UptimeWindow,
}

#[derive(Debug, Clone, Copy)]
enum CachedValue {
    Percentage(f64),
    ResponseTime(u64),
}

struct CacheEntry {
    value: CachedValue,
    stored_at: Instant,
}

/// Caching decorator. Wraps any [`UptimeStore`] and serves window queries
/// from memory until their TTL lapses or a write refreshes them.
pub struct CachedStore<S> {
    inner: S,
    ttl: Duration,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl<S: UptimeStore> CachedStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_ttl(inner, CACHE_TTL)
    }

    /// Same as [`CachedStore::new`] with a caller-chosen TTL.
    pub fn with_ttl(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() >= self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value)
    }

    fn store(&self, key: CacheKey, value: CachedValue) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Recompute every live entry of `endpoint` from the inner store.
    /// Expired entries are left for `lookup` to evict.
    fn refresh_endpoint(&self, endpoint: &str) -> Result<(), StorageError> {
        let live: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.key().endpoint == endpoint && entry.stored_at.elapsed() < self.ttl
            })
            .map(|entry| entry.key().clone())
            .collect();

        for key in live {
            let value = match key.kind {
                QueryKind::Uptime => CachedValue::Percentage(
                    self.inner.uptime_for_window(endpoint, key.window)?,
                ),
                QueryKind::ResponseTime => CachedValue::ResponseTime(
                    self.inner.average_response_time_for_window(endpoint, key.window)?,
                ),
            };
            self.store(key, value);
        }
        Ok(())
    }

    fn drop_endpoint(&self, endpoint: &str) {
        self.entries.retain(|key, _| key.endpoint != endpoint);
    }
}

impl<S: UptimeStore> UptimeStore for CachedStore<S> {
    fn ingest(&self, endpoint: &str, result: &CheckResult) -> Result<(), StorageError> {
        self.inner.ingest(endpoint, result)?;
        // A failed recompute never fails the committed write; dropping the
        // entries makes the next read fall through to the backend instead.
        if let Err(e) = self.refresh_endpoint(endpoint) {
            tracing::debug!("dropping cached statistics for {}: {}", endpoint, e);
            self.drop_endpoint(endpoint);
        }
        Ok(())
    }

    fn uptime_between(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, StorageError> {
        self.inner.uptime_between(endpoint, from, to)
    }

    fn average_response_time_between(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        self.inner.average_response_time_between(endpoint, from, to)
    }

    fn hourly_average_response_times(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<i64, u64>, StorageError> {
        self.inner.hourly_average_response_times(endpoint, from, to)
    }

    fn cleanup(&self, endpoint: &str, max_age: DateTime<Utc>) -> Result<(), StorageError> {
        self.inner.cleanup(endpoint, max_age)?;
        self.drop_endpoint(endpoint);
        Ok(())
    }

    fn remove_endpoint(&self, endpoint: &str) -> Result<(), StorageError> {
        self.inner.remove_endpoint(endpoint)?;
        self.drop_endpoint(endpoint);
        Ok(())
    }

    fn endpoints(&self) -> Result<Vec<String>, StorageError> {
        self.inner.endpoints()
    }

    fn uptime_for_window(&self, endpoint: &str, window: UptimeWindow) -> Result<f64, StorageError> {
        let key = CacheKey {
            endpoint: endpoint.to_string(),
            kind: QueryKind::Uptime,
            window,
        };
        if let Some(CachedValue::Percentage(pct)) = self.lookup(&key) {
            return Ok(pct);
        }
        let pct = self.inner.uptime_for_window(endpoint, window)?;
        self.store(key, CachedValue::Percentage(pct));
        Ok(pct)
    }

    fn average_response_time_for_window(
        &self,
        endpoint: &str,
        window: UptimeWindow,
    ) -> Result<u64, StorageError> {
        let key = CacheKey {
            endpoint: endpoint.to_string(),
            kind: QueryKind::ResponseTime,
            window,
        };
        if let Some(CachedValue::ResponseTime(average)) = self.lookup(&key) {
            return Ok(average);
        }
        let average = self.inner.average_response_time_for_window(endpoint, window)?;
        self.store(key, CachedValue::ResponseTime(average));
        Ok(average)
    }

    fn snapshot(&self, endpoint: &str) -> Result<UptimeSnapshot, StorageError> {
        // Assembled from the per-window path so each field shares its cache
        // entry with direct window queries.
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
