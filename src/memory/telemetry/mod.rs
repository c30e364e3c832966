//! Telemetry: event log, counters and snapshot persistence.

pub mod flusher;
pub mod stats;

pub use flusher::TelemetryFlusher;
pub use stats::{
    Counters, DEFAULT_LOG_LIMIT, EventDetails, LOG_CAPACITY, PersistedState, StatEvent, StatKind,
    StatsSnapshot, Telemetry,
};
