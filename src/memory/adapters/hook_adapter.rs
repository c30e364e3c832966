//! JSON hook envelopes from a host runtime, routed to [`LifecycleHooks`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::event::{LifecycleEvent, SessionContext, default_on_invalid};
use crate::memory::engine::core::LifecycleHooks;

/// Initialize tracing with a basic subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

/// Host hook names understood by the adapter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookName {
    /// `before_agent_start`
    TurnStart,
    /// `agent_end`
    TurnEnd,
    /// `command:new` or `session_reset`
    ConversationReset,
}

impl HookName {
    /// Map a host hook name; unknown names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "before_agent_start" => Some(Self::TurnStart),
            "agent_end" => Some(Self::TurnEnd),
            "command:new" | "session_reset" => Some(Self::ConversationReset),
            _ => None,
        }
    }
}

/// One hook invocation as sent by the host.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookEnvelope {
    /// Hook name.
    #[serde(deserialize_with = "default_on_invalid")]
    pub hook: String,
    /// Event payload.
    #[serde(deserialize_with = "default_on_invalid")]
    pub event: LifecycleEvent,
    /// Session identity.
    #[serde(deserialize_with = "default_on_invalid")]
    pub context: SessionContext,
}

/// Reply sent back to the host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookReply {
    /// Context to prepend to the turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepend_context: Option<String>,
    /// Session counter after a reset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_count: Option<u64>,
}

/// Route an envelope to the matching hook.
pub async fn dispatch(hooks: &dyn LifecycleHooks, envelope: &HookEnvelope) -> HookReply {
    let Some(name) = HookName::parse(&envelope.hook) else {
        debug!(hook = %envelope.hook, "Ignoring unknown hook");
        return HookReply::default();
    };

    match name {
        HookName::TurnStart => HookReply {
            prepend_context: hooks.on_turn_start(&envelope.event, &envelope.context).await,
            ..HookReply::default()
        },
        HookName::TurnEnd => {
            hooks.on_turn_end(&envelope.event, &envelope.context).await;
            HookReply::default()
        }
        HookName::ConversationReset => HookReply {
            conversation_count: Some(hooks.on_conversation_reset(&envelope.context).await),
            ..HookReply::default()
        },
    }
}

/// Parse a raw JSON envelope, dispatch it and serialize the reply.
///
/// # Errors
/// Returns an error if the envelope does not deserialize.
pub async fn dispatch_json(hooks: &dyn LifecycleHooks, raw: &Value) -> MemoryResult<Value> {
    let envelope: HookEnvelope = serde_json::from_value(raw.clone())?;
    let reply = dispatch(hooks, &envelope).await;
    Ok(serde_json::to_value(reply)?)
}
