//! In-process telemetry: bounded event log, counters and durable snapshot.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::memory::core::errors::MemoryResult;

/// Max entries kept in the event log.
pub const LOG_CAPACITY: usize = 200;
/// Default number of entries returned by [`Telemetry::logs`].
pub const DEFAULT_LOG_LIMIT: usize = 50;

const PREVIEW_CHARS: usize = 100;

/// Kind of a telemetry event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    /// Event filtered as a heartbeat.
    Heartbeat,
    /// Successful recall.
    Search,
    /// Failed recall.
    SearchError,
    /// Successful capture.
    Add,
    /// Failed capture.
    AddError,
    /// Pipeline skipped without calling the service.
    Skip,
}

impl StatKind {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Search => "search",
            Self::SearchError => "search_error",
            Self::Add => "add",
            Self::AddError => "add_error",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StatKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "heartbeat" => Ok(Self::Heartbeat),
            "search" => Ok(Self::Search),
            "search_error" => Ok(Self::SearchError),
            "add" => Ok(Self::Add),
            "add_error" => Ok(Self::AddError),
            "skip" => Ok(Self::Skip),
            _ => Err(value.to_string()),
        }
    }
}

/// Optional fields attached to a recorded event.
#[derive(Clone, Debug, Default)]
pub struct EventDetails {
    /// Short description; cut to a preview length.
    pub preview: String,
    /// Time spent, if measured.
    pub duration_ms: Option<u64>,
    /// Error message, for error kinds.
    pub error: Option<String>,
    /// Free-form debug payload.
    pub debug: Option<Value>,
}

impl EventDetails {
    /// Details with a preview text.
    #[must_use]
    pub fn new(preview: impl Into<String>) -> Self {
        Self {
            preview: preview.into(),
            ..Self::default()
        }
    }

    /// Attach a duration.
    #[must_use]
    pub const fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach an error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach a debug payload.
    #[must_use]
    pub fn with_debug(mut self, debug: Value) -> Self {
        self.debug = Some(debug);
        self
    }
}

/// One log line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatEvent {
    /// Monotonic id.
    pub id: u64,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: StatKind,
    /// Short preview.
    pub preview: String,
    /// Time spent.
    pub duration_ms: Option<u64>,
    /// Error message.
    pub error: Option<String>,
    /// Debug payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}

/// Aggregate totals since start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Counters {
    /// Every recorded event.
    pub total_events: u64,
    /// Heartbeats filtered.
    pub heartbeats_filtered: u64,
    /// Successful recalls.
    pub search_calls: u64,
    /// Successful captures.
    pub add_calls: u64,
    /// Failed recalls and captures.
    pub errors: u64,
    /// Start of the current process.
    pub started_at: DateTime<Utc>,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            total_events: 0,
            heartbeats_filtered: 0,
            search_calls: 0,
            add_calls: 0,
            errors: 0,
            started_at: Utc::now(),
        }
    }
}

impl Counters {
    fn count(&mut self, kind: StatKind) {
        self.total_events += 1;
        match kind {
            StatKind::Heartbeat => self.heartbeats_filtered += 1,
            StatKind::Search => self.search_calls += 1,
            StatKind::Add => self.add_calls += 1,
            StatKind::SearchError | StatKind::AddError => self.errors += 1,
            StatKind::Skip => {}
        }
    }
}

/// Counters plus derived figures, as served to observers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Totals.
    #[serde(flatten)]
    pub counters: Counters,
    /// Seconds since `started_at`.
    pub uptime_secs: i64,
    /// Entries currently in the log.
    pub log_size: usize,
    /// Log capacity.
    pub log_capacity: usize,
}

/// Durable snapshot written to disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    /// Dashboard config overrides.
    pub config_overrides: Map<String, Value>,
    /// Counters at write time.
    pub stats: Option<Counters>,
}

#[derive(Debug)]
struct TelemetryState {
    log: VecDeque<StatEvent>,
    next_id: u64,
    counters: Counters,
    overrides: Map<String, Value>,
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self {
            log: VecDeque::with_capacity(LOG_CAPACITY),
            next_id: 1,
            counters: Counters::default(),
            overrides: Map::new(),
        }
    }
}

/// Telemetry recorder shared by the pipeline and its observers.
///
/// State mutations are short synchronous critical sections; disk writes
/// happen after the lock is released. Accessors return owned copies.
#[derive(Debug, Default)]
pub struct Telemetry {
    state: Mutex<TelemetryState>,
    path: Option<PathBuf>,
    write_lock: tokio::sync::Mutex<()>,
}

impl Telemetry {
    /// Telemetry that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Fresh telemetry persisting to `path`.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Load the snapshot at `path`, if any, and keep persisting there.
    ///
    /// Counters and overrides are restored; `started_at` is reset to now.
    /// A missing or unreadable snapshot yields fresh state.
    pub async fn restore(path: impl Into<PathBuf>) -> Self {
        let telemetry = Self::with_path(path);
        let Some(path) = telemetry.path.as_deref() else {
            return telemetry;
        };

        let restored = match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(state) => Some(state),
                Err(err) => {
                    warn!(path = %path.display(), %err, "Ignoring unreadable telemetry snapshot");
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), %err, "Failed to read telemetry snapshot");
                None
            }
        };

        if let Some(snapshot) = restored {
            let mut state = telemetry.lock();
            if let Some(mut counters) = snapshot.stats {
                counters.started_at = Utc::now();
                state.counters = counters;
            }
            state.overrides = snapshot.config_overrides;
            info!(
                path = %path.display(),
                total_events = state.counters.total_events,
                overrides = state.overrides.len(),
                "Restored telemetry snapshot"
            );
        }

        telemetry
    }

    /// Snapshot location, if persistence is enabled.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an event and update counters.
    pub fn record(&self, kind: StatKind, details: EventDetails) -> StatEvent {
        let mut state = self.lock();
        state.counters.count(kind);

        let event = StatEvent {
            id: state.next_id,
            timestamp: Utc::now(),
            kind,
            preview: details.preview.chars().take(PREVIEW_CHARS).collect(),
            duration_ms: details.duration_ms,
            error: details.error,
            debug: details.debug,
        };
        state.next_id += 1;

        if state.log.len() >= LOG_CAPACITY {
            state.log.pop_front();
        }
        state.log.push_back(event.clone());
        event
    }

    /// Current counters.
    #[must_use]
    pub fn counters(&self) -> Counters {
        self.lock().counters.clone()
    }

    /// Counters plus uptime and log size.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.lock();
        let uptime_secs = (Utc::now() - state.counters.started_at).num_seconds().max(0);
        StatsSnapshot {
            counters: state.counters.clone(),
            uptime_secs,
            log_size: state.log.len(),
            log_capacity: LOG_CAPACITY,
        }
    }

    /// Newest-first log entries, optionally filtered by kind.
    ///
    /// `limit` is clamped to `[1, LOG_CAPACITY]`.
    #[must_use]
    pub fn logs(&self, kind: Option<StatKind>, limit: usize) -> Vec<StatEvent> {
        let limit = limit.clamp(1, LOG_CAPACITY);
        self.lock()
            .log
            .iter()
            .rev()
            .filter(|event| kind.is_none_or(|k| event.kind == k))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Current config overrides.
    #[must_use]
    pub fn overrides(&self) -> Map<String, Value> {
        self.lock().overrides.clone()
    }

    /// Edit the overrides in place under the state lock.
    ///
    /// Concurrent edits are serialized; whatever `edit` derives from the map
    /// (such as a rebuilt config) stays consistent with it. Nothing is
    /// persisted; call [`Telemetry::flush`] afterwards.
    pub fn update_overrides<R>(&self, edit: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        let mut state = self.lock();
        edit(&mut state.overrides)
    }

    /// Replace the config overrides and persist immediately.
    pub async fn set_overrides(&self, overrides: Map<String, Value>) {
        self.update_overrides(|current| *current = overrides);
        self.flush().await;
    }

    /// Drop every config override and persist immediately.
    pub async fn clear_overrides(&self) {
        self.update_overrides(Map::clear);
        self.flush().await;
    }

    /// Owned copy of the durable state.
    #[must_use]
    pub fn snapshot(&self) -> PersistedState {
        let state = self.lock();
        PersistedState {
            config_overrides: state.overrides.clone(),
            stats: Some(state.counters.clone()),
        }
    }

    /// Write the snapshot to disk.
    ///
    /// # Errors
    /// Returns an error if serialization or both write strategies fail.
    pub async fn persist(&self) -> MemoryResult<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        // Snapshot under the write lock so an older state never lands last.
        let _guard = self.write_lock.lock().await;
        let bytes = serde_json::to_vec_pretty(&self.snapshot())?;
        write_atomic(path, &bytes).await
    }

    /// Persist, logging instead of failing.
    ///
    /// Returns whether the snapshot reached disk (or no path is configured).
    pub async fn flush(&self) -> bool {
        match self.persist().await {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "Failed to persist telemetry snapshot");
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write via a temp file and rename, falling back to a direct write.
async fn write_atomic(path: &Path, bytes: &[u8]) -> MemoryResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let renamed = match tokio::fs::write(&tmp_path, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp_path, path).await,
        Err(err) => Err(err),
    };

    match renamed {
        Ok(()) => {
            debug!(path = %path.display(), "Persisted telemetry snapshot");
            Ok(())
        }
        Err(err) => {
            debug!(path = %path.display(), %err, "Atomic write failed, writing in place");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            tokio::fs::write(path, bytes).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counters_by_kind() {
        let telemetry = Telemetry::in_memory();
        for kind in [
            StatKind::Heartbeat,
            StatKind::Search,
            StatKind::SearchError,
            StatKind::Add,
            StatKind::AddError,
            StatKind::Skip,
        ] {
            telemetry.record(kind, EventDetails::new(kind.as_str()));
        }
        let counters = telemetry.counters();
        assert_eq!(counters.total_events, 6);
        assert_eq!(counters.heartbeats_filtered, 1);
        assert_eq!(counters.search_calls, 1);
        assert_eq!(counters.add_calls, 1);
        assert_eq!(counters.errors, 2);
    }

    #[test]
    fn test_ring_buffer_is_bounded_fifo() {
        let telemetry = Telemetry::in_memory();
        for i in 0..(LOG_CAPACITY + 25) {
            telemetry.record(StatKind::Search, EventDetails::new(format!("event {i}")));
            assert!(telemetry.stats().log_size <= LOG_CAPACITY);
        }

        let logs = telemetry.logs(None, LOG_CAPACITY);
        assert_eq!(logs.len(), LOG_CAPACITY);
        assert_eq!(logs[0].id, (LOG_CAPACITY + 25) as u64);
        assert_eq!(logs[LOG_CAPACITY - 1].id, 26);
        assert_eq!(logs[LOG_CAPACITY - 1].preview, "event 25");
    }

    #[test]
    fn test_logs_filter_and_limit() {
        let telemetry = Telemetry::in_memory();
        telemetry.record(StatKind::Search, EventDetails::new("a"));
        telemetry.record(StatKind::SearchError, EventDetails::new("b").with_error("boom"));
        telemetry.record(StatKind::Search, EventDetails::new("c"));

        let searches = telemetry.logs(Some(StatKind::Search), 10);
        assert_eq!(searches.len(), 2);
        assert_eq!(searches[0].preview, "c");

        assert_eq!(telemetry.logs(None, 0).len(), 1);
        let errors = telemetry.logs(Some(StatKind::SearchError), 10);
        assert_eq!(errors[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_preview_is_truncated() {
        let telemetry = Telemetry::in_memory();
        let event = telemetry.record(StatKind::Add, EventDetails::new("x".repeat(500)));
        assert_eq!(event.preview.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn test_accessors_return_copies() {
        let telemetry = Telemetry::in_memory();
        telemetry.record(StatKind::Search, EventDetails::new("a"));
        let mut logs = telemetry.logs(None, 10);
        logs[0].preview = "changed".to_string();
        let mut overrides = telemetry.overrides();
        overrides.insert("k".to_string(), json!(1));

        assert_eq!(telemetry.logs(None, 10)[0].preview, "a");
        assert!(telemetry.overrides().is_empty());
    }

    #[test]
    fn test_stat_kind_parse() {
        assert_eq!("search_error".parse::<StatKind>(), Ok(StatKind::SearchError));
        assert!("nope".parse::<StatKind>().is_err());
    }

    #[tokio::test]
    async fn test_persist_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.json");

        let telemetry = Telemetry::with_path(&path);
        telemetry.record(StatKind::Search, EventDetails::new("a"));
        telemetry.record(StatKind::AddError, EventDetails::new("b"));
        telemetry
            .set_overrides(json!({ "timeoutMs": 900 }).as_object().cloned().unwrap())
            .await;
        let before = telemetry.counters();

        let restored = Telemetry::restore(&path).await;
        let after = restored.counters();
        assert_eq!(after.total_events, before.total_events);
        assert_eq!(after.search_calls, 1);
        assert_eq!(after.errors, 1);
        assert!(after.started_at >= before.started_at);
        assert_eq!(restored.overrides()["timeoutMs"], json!(900));
        assert!(!path.with_file_name("stats.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_restore_refreshes_started_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(
            &path,
            json!({
                "configOverrides": {},
                "stats": { "startedAt": "2020-01-01T00:00:00Z", "totalEvents": 4, "searchCalls": 4 }
            })
            .to_string(),
        )
        .unwrap();

        let old = "2020-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let before_restore = Utc::now();
        let restored = Telemetry::restore(&path).await;
        let counters = restored.counters();
        assert_eq!(counters.total_events, 4);
        assert!(counters.started_at > old);
        assert!(counters.started_at >= before_restore);
    }

    #[tokio::test]
    async fn test_persist_falls_back_when_rename_path_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::create_dir(dir.path().join("stats.json.tmp")).unwrap();

        let telemetry = Telemetry::with_path(&path);
        telemetry.record(StatKind::Add, EventDetails::new("kept"));
        telemetry.persist().await.unwrap();

        assert!(path.is_file());
        let restored = Telemetry::restore(&path).await;
        assert_eq!(restored.counters().add_calls, 1);
    }

    #[tokio::test]
    async fn test_restore_missing_or_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Telemetry::restore(dir.path().join("none.json")).await;
        assert_eq!(missing.counters().total_events, 0);

        let corrupt_path = dir.path().join("corrupt.json");
        std::fs::write(&corrupt_path, b"{not json").unwrap();
        let corrupt = Telemetry::restore(&corrupt_path).await;
        assert_eq!(corrupt.counters().total_events, 0);
        assert!(corrupt.flush().await);
    }

    #[tokio::test]
    async fn test_clear_overrides_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let telemetry = Telemetry::with_path(&path);
        telemetry
            .set_overrides(json!({ "retries": 2 }).as_object().cloned().unwrap())
            .await;
        telemetry.clear_overrides().await;

        let written: PersistedState =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(written.config_overrides.is_empty());
        assert!(written.stats.is_some());
    }
}
