//! Memory bridge orchestration module.

pub mod core;

pub use core::{
    CaptureOutcome, HookFuture, LifecycleHooks, MemoryBridge, PreviewRequest, PromptPreview,
};
