//! Heartbeat detection.
//!
//! Heartbeats are synthetic keep-alive turns; they must bypass both recall
//! and capture. Detection runs three layers and stops at the first match:
//! explicit flags/tags, prompt keywords, then keywords in the latest user
//! message only. Earlier history is never scanned, so an old heartbeat turn
//! cannot mark an unrelated later turn.

use serde::Serialize;

use crate::memory::core::config::HeartbeatConfig;
use crate::memory::core::event::{ChatMessage, LifecycleEvent, SessionContext};

/// Reserved type/source tag for heartbeat events.
pub const HEARTBEAT_TAG: &str = "heartbeat";

const PREVIEW_CHARS: usize = 120;

/// Which layer classified an event as a heartbeat.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatSignal {
    /// `isHeartbeat: true` on the event.
    ExplicitFlag,
    /// Event `type`/`source` equals the heartbeat tag.
    EventTag,
    /// Context `type`/`source` equals the heartbeat tag.
    ContextTag,
    /// A keyword appears in the prompt text.
    PromptKeyword,
    /// A keyword appears in the latest user message.
    LastUserKeyword,
}

/// Classify an event, returning the matching layer.
#[must_use]
pub fn detect_heartbeat(
    event: &LifecycleEvent,
    ctx: &SessionContext,
    config: &HeartbeatConfig,
) -> Option<HeartbeatSignal> {
    if !config.enabled {
        return None;
    }

    if event.is_heartbeat == Some(true) {
        return Some(HeartbeatSignal::ExplicitFlag);
    }
    if is_tag(event.kind.as_deref()) || is_tag(event.source.as_deref()) {
        return Some(HeartbeatSignal::EventTag);
    }
    if is_tag(ctx.kind.as_deref()) || is_tag(ctx.source.as_deref()) {
        return Some(HeartbeatSignal::ContextTag);
    }

    if event
        .prompt
        .as_deref()
        .is_some_and(|prompt| contains_keyword(prompt, &config.keywords))
    {
        return Some(HeartbeatSignal::PromptKeyword);
    }

    if event
        .last_user_message()
        .is_some_and(|message| contains_keyword(&message.text(), &config.keywords))
    {
        return Some(HeartbeatSignal::LastUserKeyword);
    }

    None
}

/// Whether the event is a heartbeat.
#[must_use]
pub fn is_heartbeat(event: &LifecycleEvent, ctx: &SessionContext, config: &HeartbeatConfig) -> bool {
    detect_heartbeat(event, ctx, config).is_some()
}

/// Every field the classifier looks at, for operator debugging.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatDiagnostics {
    /// Whether filtering is enabled.
    pub enabled: bool,
    /// Event `isHeartbeat` flag.
    pub is_heartbeat_flag: Option<bool>,
    /// Event `type`.
    pub event_type: Option<String>,
    /// Event `source`.
    pub event_source: Option<String>,
    /// Context `type`.
    pub context_type: Option<String>,
    /// Context `source`.
    pub context_source: Option<String>,
    /// Start of the prompt text.
    pub prompt_preview: Option<String>,
    /// Start of the latest user message.
    pub last_user_preview: Option<String>,
    /// Number of messages in the event.
    pub message_count: usize,
    /// Configured keywords.
    pub keywords: Vec<String>,
    /// Layer that matched, if any.
    pub matched: Option<HeartbeatSignal>,
}

/// Snapshot the classifier inputs; does not influence classification.
#[must_use]
pub fn diagnose(
    event: &LifecycleEvent,
    ctx: &SessionContext,
    config: &HeartbeatConfig,
) -> HeartbeatDiagnostics {
    HeartbeatDiagnostics {
        enabled: config.enabled,
        is_heartbeat_flag: event.is_heartbeat,
        event_type: event.kind.clone(),
        event_source: event.source.clone(),
        context_type: ctx.kind.clone(),
        context_source: ctx.source.clone(),
        prompt_preview: event.prompt.as_deref().map(preview),
        last_user_preview: event
            .last_user_message()
            .map(ChatMessage::text)
            .map(|text| preview(&text)),
        message_count: event.messages.len(),
        keywords: config.keywords.clone(),
        matched: detect_heartbeat(event, ctx, config),
    }
}

fn is_tag(value: Option<&str>) -> bool {
    value.is_some_and(|tag| tag.trim().eq_ignore_ascii_case(HEARTBEAT_TAG))
}

fn contains_keyword(text: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .filter(|keyword| !keyword.is_empty())
        .any(|keyword| text.contains(keyword.as_str()))
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
