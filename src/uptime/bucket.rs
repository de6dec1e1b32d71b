//! Hourly execution counters.

use chrono::{DateTime, Utc};

/// Seconds in one bucket.
const HOUR_SECONDS: i64 = 3600;

/// Aggregated execution counters for one endpoint over one hour.
///
/// Buckets are created lazily on the first ingest for their hour and only
/// ever grow until retention cleanup deletes them whole. Invariant:
/// `successful_executions <= total_executions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HourlyBucket {
    /// Total number of check executions folded into this hour.
    pub total_executions: u64,
    /// Number of those executions that succeeded.
    pub successful_executions: u64,
    /// Sum of all execution response times, in milliseconds.
    pub total_response_time: u64,
}

impl HourlyBucket {
    /// Fold one check execution into the bucket.
    pub fn record(&mut self, success: bool, duration_millis: u64) {
        if success {
            self.successful_executions += 1;
        }
        self.total_executions += 1;
        self.total_response_time += duration_millis;
    }

    /// Average response time in milliseconds, or `None` for an empty bucket.
    pub fn average_response_time(&self) -> Option<u64> {
        if self.total_executions == 0 {
            return None;
        }
        Some(self.total_response_time / self.total_executions)
    }
}

/// Floor a timestamp to the start of its hour, as a unix timestamp.
///
/// This is the bucket key for the given instant: every result maps to
/// exactly one hour this way.
pub fn hour_floor(timestamp: DateTime<Utc>) -> i64 {
    let ts = timestamp.timestamp();
    ts - ts.rem_euclid(HOUR_SECONDS)
}
