//! Background retention task for cleaning up old uptime data.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::storage::UptimeStore;

/// How often the retention pass runs. Buckets age by the hour, so there is
/// nothing new to delete on a finer cadence.
const RUN_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodically deletes uptime data past the retention period, endpoint by
/// endpoint.
pub struct RetentionTask {
    store: Arc<dyn UptimeStore>,
    retention: ChronoDuration,
    run_interval: Duration,
    stop: Arc<Mutex<Option<tokio::sync::broadcast::Sender<()>>>>,
}

impl RetentionTask {
    pub fn new(store: Arc<dyn UptimeStore>, retention: ChronoDuration) -> Self {
        Self {
            store,
            retention,
            run_interval: RUN_INTERVAL,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Override the pass interval. Mainly useful under `tokio::time::pause`.
    pub fn with_run_interval(mut self, run_interval: Duration) -> Self {
        self.run_interval = run_interval;
        self
    }

    /// Start the retention background task.
    pub fn start(&self) {
        let store = self.store.clone();
        let retention = self.retention;
        let run_interval = self.run_interval;
        let stop = self.stop.clone();

        tokio::spawn(async move {
            let (tx, _) = tokio::sync::broadcast::channel(1);
            {
                let mut stop_guard = stop.lock().await;
                *stop_guard = Some(tx.clone());
            }

            let mut rx = tx.subscribe();
            let mut interval = tokio::time::interval(run_interval);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        enforce_retention(store.as_ref(), retention);
                    }
                }
            }
        });
    }

    /// Stop the retention task.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }
}

fn enforce_retention(store: &dyn UptimeStore, retention: ChronoDuration) {
    let endpoints = match store.endpoints() {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("RetentionTask: Failed to list endpoints: {}", e);
            return;
        }
    };

    let max_age = Utc::now() - retention;

    for endpoint in endpoints {
        if let Err(e) = store.cleanup(&endpoint, max_age) {
            tracing::error!("RetentionTask: Failed to clean up {}: {}", endpoint, e);
        }
    }
}
