//! Integration adapters for host runtimes.

pub mod hook_adapter;

pub use hook_adapter::{HookEnvelope, HookName, HookReply, dispatch, dispatch_json, init_tracing};
