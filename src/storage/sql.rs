//! SQLite-backed uptime store.
//!
//! Transaction discipline: only the public methods on `SqlStore` may begin,
//! commit, or roll back a transaction. Every private helper runs against a
//! transaction opened by its caller and never starts its own, so a failed
//! ingest or cleanup rolls back as one unit with no partial bucket update
//! left behind.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use super::{StorageError, UptimeStore};
use crate::uptime::{hour_floor, CheckResult, UptimeSnapshot, UptimeWindow};

/// Upper bound on how long a statement waits for a locked database.
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Ingest only runs a cleanup pass once the endpoint's oldest bucket is this
/// old, so most ingests issue no delete at all.
const CLEANUP_TRIGGER_DAYS: i64 = 10;

/// Retention boundary used by ingest-triggered cleanup.
const DEFAULT_RETENTION_DAYS: i64 = 7;

// Cleanup buffers by retention tier: rows only become candidates for
// deletion once they are this far past the requested boundary, which keeps
// the same rows from being deletion candidates on every single pass.
const SHORT_TERM_RETENTION_DAYS: i64 = 7;
const MEDIUM_TERM_RETENTION_DAYS: i64 = 14;
const LONG_TERM_RETENTION_DAYS: i64 = 60;
const SHORT_TERM_BUFFER_DAYS: i64 = 8;
const MEDIUM_TERM_BUFFER_DAYS: i64 = 15;
const LONG_TERM_BUFFER_DAYS: i64 = 65;
const DEFAULT_BUFFER_DAYS: i64 = 35;

/// Uptime store persisted in SQLite, one row per endpoint-hour.
#[derive(Clone)]
pub struct SqlStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS endpoint_uptimes (
                endpoint_id           TEXT    NOT NULL,
                hour_unix_timestamp   INTEGER NOT NULL,
                total_executions      INTEGER NOT NULL,
                successful_executions INTEGER NOT NULL,
                total_response_time   INTEGER NOT NULL,
                UNIQUE(endpoint_id, hour_unix_timestamp)
            )",
        )?;
        Ok(())
    }
}

impl UptimeStore for SqlStore {
    fn ingest(&self, endpoint: &str, result: &CheckResult) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        update_endpoint_uptime(&tx, endpoint, result)?;

        // Cleanup rides the ingest transaction, but only once the oldest
        // bucket has drifted past the trigger threshold.
        let now = Utc::now();
        if let Some(age) = age_of_oldest_bucket(&tx, endpoint, now)? {
            if age > Duration::days(CLEANUP_TRIGGER_DAYS) {
                let max_age = now - Duration::days(DEFAULT_RETENTION_DAYS);
                let deleted = delete_old_uptime_entries(&tx, endpoint, max_age, now)?;
                if deleted > 0 {
                    tracing::debug!("deleted {} uptime rows past retention for {}", deleted, endpoint);
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn uptime_between(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let (total, successful) = sum_uptime_counts(&tx, endpoint, from, to)?;
        tx.commit()?;

        if total == 0 {
            return Ok(100.0);
        }
        Ok(successful as f64 / total as f64 * 100.0)
    }

    fn average_response_time_between(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let (total, response_time) = sum_response_times(&tx, endpoint, from, to)?;
        tx.commit()?;

        if total == 0 {
            return Ok(0);
        }
        Ok(response_time / total)
    }

    fn hourly_average_response_times(
        &self,
        endpoint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BTreeMap<i64, u64>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let averages = get_hourly_average_response_times(&tx, endpoint, from, to)?;
        tx.commit()?;
        Ok(averages)
    }

    fn cleanup(&self, endpoint: &str, max_age: DateTime<Utc>) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let deleted = delete_old_uptime_entries(&tx, endpoint, max_age, Utc::now())?;
        tx.commit()?;

        if deleted > 0 {
            tracing::debug!("deleted {} uptime rows past retention for {}", deleted, endpoint);
        }
        Ok(())
    }

    fn remove_endpoint(&self, endpoint: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM endpoint_uptimes WHERE endpoint_id = ?1",
            params![endpoint],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn endpoints(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT endpoint_id FROM endpoint_uptimes ORDER BY endpoint_id",
        )?;
        let endpoints = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(endpoints)
    }

    fn snapshot(&self, endpoint: &str) -> Result<UptimeSnapshot, StorageError> {
        // All five windows read from one transaction so they agree on the
        // same state.
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now();
        let snapshot = UptimeSnapshot {
            seven_days: percentage_in(&tx, endpoint, UptimeWindow::SevenDays, now)?,
            thirty_days: percentage_in(&tx, endpoint, UptimeWindow::ThirtyDays, now)?,
            sixty_days: percentage_in(&tx, endpoint, UptimeWindow::SixtyDays, now)?,
            ninety_days: percentage_in(&tx, endpoint, UptimeWindow::NinetyDays, now)?,
            one_hundred_twenty_days: percentage_in(
                &tx,
                endpoint,
                UptimeWindow::OneHundredTwentyDays,
                now,
            )?,
        };
        tx.commit()?;
        Ok(snapshot)
    }
}

/// Fold one result into its endpoint-hour row. The conflict arithmetic is
/// additive, so concurrent transactions and retried statements targeting the
/// same hour accumulate instead of overwriting.
fn update_endpoint_uptime(
    tx: &Transaction,
    endpoint: &str,
    result: &CheckResult,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO endpoint_uptimes (endpoint_id, hour_unix_timestamp, total_executions, successful_executions, total_response_time)
         VALUES (?1, ?2, 1, ?3, ?4)
         ON CONFLICT(endpoint_id, hour_unix_timestamp) DO UPDATE SET
             total_executions = total_executions + excluded.total_executions,
             successful_executions = successful_executions + excluded.successful_executions,
             total_response_time = total_response_time + excluded.total_response_time",
        params![
            endpoint,
            hour_floor(result.timestamp),
            i64::from(result.success),
            result.duration_millis as i64,
        ],
    )?;
    Ok(())
}

fn sum_uptime_counts(
    tx: &Transaction,
    endpoint: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> rusqlite::Result<(u64, u64)> {
    tx.query_row(
        "SELECT SUM(total_executions), SUM(successful_executions) FROM endpoint_uptimes
         WHERE endpoint_id = ?1 AND hour_unix_timestamp >= ?2 AND hour_unix_timestamp <= ?3",
        params![endpoint, from.timestamp(), to.timestamp()],
        |row| {
            let total: Option<i64> = row.get(0)?;
            let successful: Option<i64> = row.get(1)?;
            Ok((total.unwrap_or(0) as u64, successful.unwrap_or(0) as u64))
        },
    )
}

fn sum_response_times(
    tx: &Transaction,
    endpoint: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> rusqlite::Result<(u64, u64)> {
    tx.query_row(
        "SELECT SUM(total_executions), SUM(total_response_time) FROM endpoint_uptimes
         WHERE endpoint_id = ?1 AND hour_unix_timestamp >= ?2 AND hour_unix_timestamp <= ?3",
        params![endpoint, from.timestamp(), to.timestamp()],
        |row| {
            let total: Option<i64> = row.get(0)?;
            let response_time: Option<i64> = row.get(1)?;
            Ok((total.unwrap_or(0) as u64, response_time.unwrap_or(0) as u64))
        },
    )
}

fn get_hourly_average_response_times(
    tx: &Transaction,
    endpoint: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> rusqlite::Result<BTreeMap<i64, u64>> {
    let mut stmt = tx.prepare(
        "SELECT hour_unix_timestamp, total_executions, total_response_time FROM endpoint_uptimes
         WHERE endpoint_id = ?1 AND hour_unix_timestamp >= ?2 AND hour_unix_timestamp <= ?3
         ORDER BY hour_unix_timestamp",
    )?;
    let rows = stmt
        .query_map(
            params![endpoint, from.timestamp(), to.timestamp()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .filter(|(_, total, _)| *total > 0)
        .map(|(hour, total, response_time)| (hour, (response_time / total) as u64))
        .collect())
}

fn percentage_in(
    tx: &Transaction,
    endpoint: &str,
    window: UptimeWindow,
    now: DateTime<Utc>,
) -> Result<f64, StorageError> {
    let (from, to) = window.range(now);
    let (total, successful) = sum_uptime_counts(tx, endpoint, from, to)?;
    if total == 0 {
        return Ok(100.0);
    }
    Ok(successful as f64 / total as f64 * 100.0)
}

/// Age of the endpoint's oldest bucket as of `now`, or `None` without data.
fn age_of_oldest_bucket(
    tx: &Transaction,
    endpoint: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<Duration>> {
    let oldest: Option<i64> = tx.query_row(
        "SELECT MIN(hour_unix_timestamp) FROM endpoint_uptimes WHERE endpoint_id = ?1",
        params![endpoint],
        |row| row.get(0),
    )?;
    Ok(oldest.map(|ts| Duration::seconds(now.timestamp() - ts)))
}

/// Delete rows past the retention boundary `max_age`, lagged by the tier's
/// cleanup buffer so rows near the boundary are not deletion candidates on
/// every pass. Returns the number of rows removed.
fn delete_old_uptime_entries(
    tx: &Transaction,
    endpoint: &str,
    max_age: DateTime<Utc>,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    let buffer_days = if max_age < now - Duration::days(LONG_TERM_RETENTION_DAYS) {
        LONG_TERM_BUFFER_DAYS
    } else if max_age < now - Duration::days(MEDIUM_TERM_RETENTION_DAYS) {
        MEDIUM_TERM_BUFFER_DAYS
    } else if max_age < now - Duration::days(SHORT_TERM_RETENTION_DAYS) {
        SHORT_TERM_BUFFER_DAYS
    } else {
        DEFAULT_BUFFER_DAYS
    };
    let cutoff = max_age - Duration::days(buffer_days);

    tx.execute(
        "DELETE FROM endpoint_uptimes WHERE endpoint_id = ?1 AND hour_unix_timestamp < ?2",
        params![endpoint, cutoff.timestamp()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::thread;
    use tempfile::NamedTempFile;

    fn result_at(timestamp: DateTime<Utc>, success: bool, duration_millis: u64) -> CheckResult {
        CheckResult {
            timestamp,
            success,
            duration_millis,
        }
    }

    fn open_store() -> (NamedTempFile, SqlStore) {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqlStore::open(tmp.path()).unwrap();
        (tmp, store)
    }

    /// Insert a bucket row directly, without the ingest cleanup trigger.
    /// Ingesting a result much older than the retention boundary would be
    /// cleaned up by its own ingest, so backdated fixtures go through here.
    fn seed(store: &SqlStore, endpoint: &str, result: &CheckResult) {
        let conn = store.conn.lock().unwrap();
        let tx = conn.unchecked_transaction().unwrap();
        update_endpoint_uptime(&tx, endpoint, result).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_upsert_accumulates_in_one_row() {
        let (_tmp, store) = open_store();
        let at = Utc::now();
        store.ingest("api", &result_at(at, true, 100)).unwrap();
        store.ingest("api", &result_at(at, false, 50)).unwrap();

        let from = at - Duration::hours(1);
        let to = at + Duration::hours(1);
        let pct = store.uptime_between("api", from, to).unwrap();
        assert!((pct - 50.0).abs() < 1e-9);
        assert_eq!(
            store.average_response_time_between("api", from, to).unwrap(),
            75
        );

        // Both results merged into a single hour row
        let averages = store.hourly_average_response_times("api", from, to).unwrap();
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[&hour_floor(at)], 75);
    }

    #[test]
    fn test_concurrent_ingest_same_hour() {
        let (_tmp, store) = open_store();
        let at = Utc::now();

        let success_store = store.clone();
        let success = thread::spawn(move || {
            success_store
                .ingest("api", &result_at(at, true, 100))
                .unwrap();
        });
        let failure_store = store.clone();
        let failure = thread::spawn(move || {
            failure_store
                .ingest("api", &result_at(at, false, 50))
                .unwrap();
        });
        success.join().unwrap();
        failure.join().unwrap();

        let from = at - Duration::hours(1);
        let to = at + Duration::hours(1);
        let pct = store.uptime_between("api", from, to).unwrap();
        assert!((pct - 50.0).abs() < 1e-9);
        assert_eq!(
            store.average_response_time_between("api", from, to).unwrap(),
            75
        );
        let averages = store.hourly_average_response_times("api", from, to).unwrap();
        assert_eq!(averages.len(), 1);
    }

    #[test]
    fn test_no_data_reads_as_one_hundred() {
        let (_tmp, store) = open_store();
        let now = Utc::now();
        let pct = store
            .uptime_between("ghost", now - Duration::days(7), now)
            .unwrap();
        assert_eq!(pct, 100.0);
        assert_eq!(
            store
                .average_response_time_between("ghost", now - Duration::days(7), now)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let (_tmp, store) = open_store();
        let h2 = Utc.timestamp_opt(hour_floor(Utc::now()), 0).unwrap();
        let h1 = h2 - Duration::hours(2);
        store.ingest("api", &result_at(h1, false, 10)).unwrap();
        store.ingest("api", &result_at(h2, false, 10)).unwrap();

        assert_eq!(store.uptime_between("api", h1, h2).unwrap(), 0.0);
        assert_eq!(
            store
                .uptime_between(
                    "api",
                    h1 + Duration::seconds(1),
                    h2 - Duration::seconds(1)
                )
                .unwrap(),
            100.0
        );
    }

    #[test]
    fn test_cleanup_buffer_tiers() {
        let (_tmp, store) = open_store();
        let now = Utc::now();

        // Long-term boundary: 65-day buffer past a 90-day max age
        seed(&store, "long", &result_at(now - Duration::days(150), false, 1));
        seed(&store, "long", &result_at(now - Duration::days(160), false, 1));
        store.cleanup("long", now - Duration::days(90)).unwrap();
        let averages = store
            .hourly_average_response_times("long", now - Duration::days(365), now)
            .unwrap();
        assert_eq!(averages.len(), 1, "only the 160-day row is past 90+65 days");

        // Medium-term boundary: 15-day buffer past a 30-day max age
        seed(&store, "medium", &result_at(now - Duration::days(40), false, 1));
        seed(&store, "medium", &result_at(now - Duration::days(50), false, 1));
        store.cleanup("medium", now - Duration::days(30)).unwrap();
        let averages = store
            .hourly_average_response_times("medium", now - Duration::days(365), now)
            .unwrap();
        assert_eq!(averages.len(), 1, "only the 50-day row is past 30+15 days");

        // Short-term boundary: 8-day buffer past a 10-day max age
        seed(&store, "short", &result_at(now - Duration::days(15), false, 1));
        seed(&store, "short", &result_at(now - Duration::days(20), false, 1));
        store.cleanup("short", now - Duration::days(10)).unwrap();
        let averages = store
            .hourly_average_response_times("short", now - Duration::days(365), now)
            .unwrap();
        assert_eq!(averages.len(), 1, "only the 20-day row is past 10+8 days");

        // Default tier: 35-day buffer past a 1-day max age
        seed(&store, "default", &result_at(now - Duration::days(30), false, 1));
        seed(&store, "default", &result_at(now - Duration::days(40), false, 1));
        store.cleanup("default", now - Duration::days(1)).unwrap();
        let averages = store
            .hourly_average_response_times("default", now - Duration::days(365), now)
            .unwrap();
        assert_eq!(averages.len(), 1, "only the 40-day row is past 1+35 days");
    }

    #[test]
    fn test_ingest_triggers_cleanup_past_threshold() {
        let (_tmp, store) = open_store();
        let now = Utc::now();

        // Oldest bucket at 50 days trips the 10-day trigger, and 50 days is
        // past the effective 7+35-day cutoff
        seed(&store, "churn", &result_at(now - Duration::days(50), false, 1));
        store.ingest("churn", &result_at(now, true, 1)).unwrap();
        let pct = store
            .uptime_between("churn", now - Duration::days(60), now)
            .unwrap();
        assert_eq!(pct, 100.0, "the 50-day failure bucket was cleaned up");

        // A 20-day bucket trips the trigger too, but sits inside the cleanup
        // buffer and must survive
        seed(&store, "lag", &result_at(now - Duration::days(20), false, 1));
        store.ingest("lag", &result_at(now, true, 1)).unwrap();
        let pct = store
            .uptime_between("lag", now - Duration::days(60), now)
            .unwrap();
        assert!((pct - 50.0).abs() < 1e-9, "buffered bucket survived ingest cleanup");

        // A 5-day bucket never trips the trigger
        seed(&store, "fresh", &result_at(now - Duration::days(5), false, 1));
        store.ingest("fresh", &result_at(now, true, 1)).unwrap();
        let pct = store
            .uptime_between("fresh", now - Duration::days(60), now)
            .unwrap();
        assert!((pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_persists_across_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        let at = Utc::now();
        {
            let store = SqlStore::open(tmp.path()).unwrap();
            store.ingest("api", &result_at(at, true, 25)).unwrap();
        }

        let store = SqlStore::open(tmp.path()).unwrap();
        let pct = store
            .uptime_between("api", at - Duration::hours(1), at + Duration::hours(1))
            .unwrap();
        assert_eq!(pct, 100.0);
        assert_eq!(store.endpoints().unwrap(), vec!["api".to_string()]);
    }

    #[test]
    fn test_remove_endpoint() {
        let (_tmp, store) = open_store();
        let now = Utc::now();
        store.ingest("a", &result_at(now, false, 1)).unwrap();
        store.ingest("b", &result_at(now, true, 1)).unwrap();

        store.remove_endpoint("a").unwrap();
        assert_eq!(store.endpoints().unwrap(), vec!["b".to_string()]);
        assert_eq!(
            store
                .uptime_between("a", now - Duration::days(1), now)
                .unwrap(),
            100.0
        );
    }

    #[test]
    fn test_snapshot_reads_all_windows() {
        let (_tmp, store) = open_store();
        let now = Utc::now();
        store
            .ingest("api", &result_at(now - Duration::days(10), false, 1))
            .unwrap();
        store
            .ingest("api", &result_at(now - Duration::days(1), true, 1))
            .unwrap();

        let snapshot = store.snapshot("api").unwrap();
        assert_eq!(snapshot.seven_days, 100.0);
        assert!((snapshot.thirty_days - 50.0).abs() < 1e-9);
        assert!((snapshot.one_hundred_twenty_days - 50.0).abs() < 1e-9);

        // The default trait derivation agrees with the single-transaction read
        let seven = store
            .uptime_for_window("api", UptimeWindow::SevenDays)
            .unwrap();
        assert_eq!(seven, 100.0);
    }
}
