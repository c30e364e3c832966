//! Memory bridge between a host agent and a remote memory service.
//!
//! This module is organized into:
//! - `core`: Configuration, env discovery, errors, events and conversation ids
//! - `ingest`: Heartbeat gating and capture payloads
//! - `retrieval`: Search payloads and the resilient service client
//! - `prompt`: Response parsing and prompt block rendering
//! - `telemetry`: Event log, counters and snapshot persistence
//! - `engine`: Recall/capture orchestration
//! - `adapters`: Host hook dispatch

pub mod adapters;
pub mod core;
pub mod engine;
pub mod ingest;
pub mod prompt;
pub mod retrieval;
pub mod telemetry;

// Re-export commonly used types for convenience
pub use adapters::{HookEnvelope, HookReply, dispatch, init_tracing};
pub use core::{
    ChatMessage, DotenvProvider, EffectiveConfig, EnvProvider, LifecycleEvent, MapEnvProvider,
    MemoryError, MemoryResult, MessageRole, SessionContext, resolve_config,
};
pub use engine::{CaptureOutcome, HookFuture, LifecycleHooks, MemoryBridge, PreviewRequest};
pub use ingest::{AppendPayload, is_heartbeat};
pub use prompt::{FormatOptions, PromptFormatter, QUERY_MARKER};
pub use retrieval::{ApiClient, HttpTransport, MemoryTransport, SearchPayload};
pub use telemetry::{StatKind, Telemetry, TelemetryFlusher};
