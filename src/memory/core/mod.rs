//! Core bridge types: configuration, errors, events and identity.

pub mod config;
pub mod env;
pub mod errors;
pub mod event;
pub mod ids;

pub use config::{
    CaptureConfig, CaptureStrategy, ConversationConfig, DashboardConfig, EffectiveConfig,
    HeartbeatConfig, PromptConfig, RecallConfig, ServiceConfig, SuffixMode, merge_overrides,
    resolve_config, validate_overrides,
};
pub use env::{DotenvProvider, EnvProvider, MapEnvProvider};
pub use errors::{MemoryError, MemoryResult};
pub use event::{ChatMessage, LifecycleEvent, MessageContent, MessageRole, SessionContext};
pub use ids::{ConversationCounters, ConversationResolver};
