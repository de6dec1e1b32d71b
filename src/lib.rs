//! uptrack - Uptime Statistics Engine
//!
//! Tracks per-endpoint health-check outcomes in hourly buckets and answers
//! uptime-percentage and response-time queries over fixed windows or
//! arbitrary time ranges. Buckets live either in an in-process map or in
//! SQLite, behind one storage trait, with an optional write-through cache
//! and a background retention task.

pub mod config;
pub mod maintenance;
pub mod storage;
pub mod uptime;

pub use config::{ConfigError, StorageConfig, StorageKind};
pub use maintenance::RetentionTask;
pub use storage::{new_store, CachedStore, MemoryStore, SqlStore, StorageError, UptimeStore};
pub use uptime::{hour_floor, CheckResult, HourlyBucket, Uptime, UptimeSnapshot, UptimeWindow};
