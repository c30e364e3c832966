//! Turn-end side: heartbeat gating and capture payloads.

pub mod capture;
pub mod heartbeat;

pub use capture::{
    AppendPayload, CapturedMessage, build_append_payload, select_messages, strip_injected_context,
    truncate_chars,
};
pub use heartbeat::{
    HEARTBEAT_TAG, HeartbeatDiagnostics, HeartbeatSignal, detect_heartbeat, diagnose, is_heartbeat,
};
