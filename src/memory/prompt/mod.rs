//! Prompt construction from recalled memories.

pub mod prompt_builder;
pub mod records;

pub use prompt_builder::{FormatOptions, PromptFormatter, QUERY_MARKER};
pub use records::{MemoryRecord, RecallResult, format_timestamp, preference_label, unwrap_envelope};
