//! Uptime domain model.
//!
//! Hourly buckets, the per-endpoint aggregator, and the named query windows.

mod bucket;
mod tracker;
mod window;

pub use bucket::*;
pub use tracker::*;
pub use window::*;

use chrono::{DateTime, Utc};

/// The outcome of one completed check execution, produced by an external
/// check executor and consumed read-only by this engine.
///
/// Ingest is additive: feeding the same result twice double-counts it, so
/// de-duplication is the producer's responsibility.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Whether the check passed.
    pub success: bool,
    /// How long the check took, in milliseconds.
    pub duration_millis: u64,
}
