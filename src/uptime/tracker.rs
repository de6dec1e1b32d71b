//! Per-endpoint uptime aggregation over hourly buckets.
//!
//! `Uptime` owns every bucket for one endpoint; buckets are never mutated
//! from anywhere else. Queries sum executions over an inclusive timestamp
//! range, and an empty range reads as 100%: absence of data is not a
//! failure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::bucket::{hour_floor, HourlyBucket};
use super::window::UptimeWindow;
use super::CheckResult;

/// Precomputed fixed-window percentages, refreshed on every ingest by the
/// volatile backend so its reads stay O(1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UptimeSnapshot {
    pub seven_days: f64,
    pub thirty_days: f64,
    pub sixty_days: f64,
    pub ninety_days: f64,
    pub one_hundred_twenty_days: f64,
}

impl Default for UptimeSnapshot {
    fn default() -> Self {
        // No data yet means no observed failures
        Self {
            seven_days: 100.0,
            thirty_days: 100.0,
            sixty_days: 100.0,
            ninety_days: 100.0,
            one_hundred_twenty_days: 100.0,
        }
    }
}

impl UptimeSnapshot {
    /// The precomputed percentage for `window`, or `None` for the calendar
    /// windows, which are always derived on demand.
    pub fn for_window(&self, window: UptimeWindow) -> Option<f64> {
        match window {
            UptimeWindow::SevenDays => Some(self.seven_days),
            UptimeWindow::ThirtyDays => Some(self.thirty_days),
            UptimeWindow::SixtyDays => Some(self.sixty_days),
            UptimeWindow::NinetyDays => Some(self.ninety_days),
            UptimeWindow::OneHundredTwentyDays => Some(self.one_hundred_twenty_days),
            UptimeWindow::LastMonth | UptimeWindow::Last90Days | UptimeWindow::LastYear => None,
        }
    }
}

/// Hourly uptime statistics for a single endpoint.
#[derive(Debug, Clone, Default)]
pub struct Uptime {
    hourly_buckets: BTreeMap<i64, HourlyBucket>,
    snapshot: UptimeSnapshot,
}

impl Uptime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one check result into its hour bucket, creating it on first use.
    pub fn record(&mut self, result: &CheckResult) {
        let hour = hour_floor(result.timestamp);
        self.hourly_buckets
            .entry(hour)
            .or_default()
            .record(result.success, result.duration_millis);
    }

    /// Uptime percentage over `[from, to]`, both bounds inclusive.
    pub fn percentage_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        let mut total_executions: u64 = 0;
        let mut successful_executions: u64 = 0;
        for (_, bucket) in self.buckets_between(from, to) {
            total_executions += bucket.total_executions;
            successful_executions += bucket.successful_executions;
        }
        if total_executions == 0 {
            return 100.0;
        }
        successful_executions as f64 / total_executions as f64 * 100.0
    }

    /// Average response time in milliseconds over `[from, to]`, `0` when the
    /// range holds no executions.
    pub fn average_response_time_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
        let mut total_executions: u64 = 0;
        let mut total_response_time: u64 = 0;
        for (_, bucket) in self.buckets_between(from, to) {
            total_executions += bucket.total_executions;
            total_response_time += bucket.total_response_time;
        }
        if total_executions == 0 {
            return 0;
        }
        total_response_time / total_executions
    }

    /// Per-hour average response times over `[from, to]`, keyed by the hour
    /// timestamp. Hours without executions are omitted.
    pub fn hourly_average_response_times(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BTreeMap<i64, u64> {
        self.buckets_between(from, to)
            .filter_map(|(hour, bucket)| Some((*hour, bucket.average_response_time()?)))
            .collect()
    }

    /// Delete every bucket strictly older than `cutoff`. A bucket whose hour
    /// starts exactly at the cutoff is kept.
    pub fn cleanup_older_than(&mut self, cutoff: DateTime<Utc>) {
        let threshold = cutoff.timestamp();
        self.hourly_buckets.retain(|hour, _| *hour >= threshold);
    }

    /// Recompute the fixed-window percentages as of `now`.
    pub fn refresh_snapshot(&mut self, now: DateTime<Utc>) {
        self.snapshot = UptimeSnapshot {
            seven_days: self.percentage_for(UptimeWindow::SevenDays, now),
            thirty_days: self.percentage_for(UptimeWindow::ThirtyDays, now),
            sixty_days: self.percentage_for(UptimeWindow::SixtyDays, now),
            ninety_days: self.percentage_for(UptimeWindow::NinetyDays, now),
            one_hundred_twenty_days: self.percentage_for(UptimeWindow::OneHundredTwentyDays, now),
        };
    }

    /// The most recently refreshed snapshot.
    pub fn snapshot(&self) -> UptimeSnapshot {
        self.snapshot
    }

    pub fn bucket_count(&self) -> usize {
        self.hourly_buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hourly_buckets.is_empty()
    }

    fn percentage_for(&self, window: UptimeWindow, now: DateTime<Utc>) -> f64 {
        let (from, to) = window.range(now);
        self.percentage_between(from, to)
    }

    // An inverted range is not a panic, just a range with nothing in it.
    fn buckets_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = (&i64, &HourlyBucket)> {
        let range =
            (from <= to).then(|| self.hourly_buckets.range(from.timestamp()..=to.timestamp()));
        range.into_iter().flatten()
    }
}
