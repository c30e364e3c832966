//! Background worker persisting the telemetry snapshot.
//!
//! Flushes on a fixed interval and once more when shutdown is signaled, so
//! counters survive a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::memory::core::config::DashboardConfig;
use crate::memory::telemetry::stats::Telemetry;

/// Periodic telemetry flusher.
pub struct TelemetryFlusher {
    telemetry: Arc<Telemetry>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl TelemetryFlusher {
    /// Create a flusher writing every `interval`.
    #[must_use]
    pub fn new(telemetry: Arc<Telemetry>, interval: Duration) -> Self {
        Self {
            telemetry,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Create a flusher using the dashboard flush interval.
    #[must_use]
    pub fn from_config(telemetry: Arc<Telemetry>, config: &DashboardConfig) -> Self {
        Self::new(telemetry, Duration::from_secs(config.flush_interval_secs))
    }

    /// Get a shutdown notifier to stop the flusher.
    ///
    /// Signal it with `notify_one` so a stop requested mid-flush is not lost.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the flusher as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if self.telemetry.path().is_none() {
            info!("Telemetry persistence is disabled");
            return;
        }

        info!(interval = ?self.interval, "Starting telemetry flusher");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.telemetry.flush().await {
                        debug!("Telemetry snapshot flushed");
                    }
                }
                () = self.shutdown.notified() => {
                    self.telemetry.flush().await;
                    info!("Telemetry flusher shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::telemetry::stats::{EventDetails, PersistedState, StatKind};

    #[tokio::test]
    async fn test_periodic_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let telemetry = Arc::new(Telemetry::with_path(&path));
        telemetry.record(StatKind::Search, EventDetails::new("q"));

        let flusher = TelemetryFlusher::new(Arc::clone(&telemetry), Duration::from_millis(20));
        let shutdown = flusher.shutdown_notifier();
        let handle = flusher.spawn();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(path.exists());

        shutdown.notify_one();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_final_flush_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let telemetry = Arc::new(Telemetry::with_path(&path));

        let flusher = TelemetryFlusher::new(Arc::clone(&telemetry), Duration::from_secs(3600));
        let shutdown = flusher.shutdown_notifier();
        let handle = flusher.spawn();

        telemetry.record(StatKind::Add, EventDetails::new("late"));
        shutdown.notify_one();
        handle.await.unwrap();

        let written: PersistedState =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written.stats.unwrap().add_calls, 1);
    }

    #[tokio::test]
    async fn test_in_memory_telemetry_exits_immediately() {
        let flusher =
            TelemetryFlusher::new(Arc::new(Telemetry::in_memory()), Duration::from_millis(5));
        flusher.spawn().await.unwrap();
    }
}
