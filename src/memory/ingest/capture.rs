//! Capture payload construction.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::memory::core::config::{CaptureConfig, CaptureStrategy, EffectiveConfig, SOURCE_TAG};
use crate::memory::core::event::{ChatMessage, LifecycleEvent, MessageRole, SessionContext};
use crate::memory::core::ids::ConversationResolver;
use crate::memory::prompt::prompt_builder::QUERY_MARKER;

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// One message as sent to the append endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CapturedMessage {
    /// Author role.
    pub role: MessageRole,
    /// Cleaned content.
    pub content: String,
}

impl CapturedMessage {
    /// Build a captured message.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Wire shape of the append request.
#[derive(Clone, Debug, Serialize)]
pub struct AppendPayload {
    /// User id.
    pub user_id: String,
    /// Conversation id.
    pub conversation_id: String,
    /// Selected messages.
    pub messages: Vec<CapturedMessage>,
    /// Source tag.
    pub source: String,
    /// Agent id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// App id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Free-form info map.
    pub info: Map<String, Value>,
    /// Let the service process the append asynchronously.
    pub async_mode: bool,
    /// Public visibility flag.
    pub allow_public: bool,
}

/// Build the append request for a finished turn.
///
/// Returns `None` when no message survives selection.
#[must_use]
pub fn build_append_payload(
    config: &EffectiveConfig,
    resolver: &ConversationResolver,
    event: &LifecycleEvent,
    ctx: &SessionContext,
) -> Option<AppendPayload> {
    let messages = select_messages(&event.messages, &config.capture);
    if messages.is_empty() {
        return None;
    }

    let capture = &config.capture;
    let agent_id = capture.agent_id.clone().or_else(|| ctx.agent_id.clone());

    Some(AppendPayload {
        user_id: config.service.user_id.clone(),
        conversation_id: resolver.resolve(&config.conversation, ctx),
        messages,
        source: SOURCE_TAG.to_string(),
        agent_id,
        app_id: capture.app_id.clone(),
        tags: capture.tags.clone(),
        info: build_info(capture, ctx),
        async_mode: capture.async_mode,
        allow_public: capture.allow_public,
    })
}

/// Select and clean the messages to capture.
#[must_use]
pub fn select_messages(messages: &[ChatMessage], config: &CaptureConfig) -> Vec<CapturedMessage> {
    let slice = match config.strategy {
        CaptureStrategy::FullSession => messages,
        CaptureStrategy::LastTurn => {
            let Some(start) = messages
                .iter()
                .rposition(|message| message.role == MessageRole::User)
            else {
                return Vec::new();
            };
            &messages[start..]
        }
    };

    slice
        .iter()
        .filter_map(|message| extract_message(message, config))
        .collect()
}

fn extract_message(message: &ChatMessage, config: &CaptureConfig) -> Option<CapturedMessage> {
    let content = match message.role {
        MessageRole::User => strip_injected_context(&message.text()),
        MessageRole::Assistant if config.include_assistant => message.text().trim().to_string(),
        _ => return None,
    };

    let content = truncate_chars(&content, config.max_message_chars);
    (!content.is_empty()).then(|| CapturedMessage::new(message.role, content))
}

/// Drop everything up to the query marker, keeping the real user input.
#[must_use]
pub fn strip_injected_context(text: &str) -> String {
    text.rfind(QUERY_MARKER).map_or_else(
        || text.trim().to_string(),
        |index| text[index + QUERY_MARKER.len()..].trim().to_string(),
    )
}

/// Truncate to `max` chars, appending [`ELLIPSIS`]. `0` means unlimited.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str(ELLIPSIS);
    out
}

fn build_info(config: &CaptureConfig, ctx: &SessionContext) -> Map<String, Value> {
    let mut info = Map::new();
    info.insert("source".to_string(), Value::String(SOURCE_TAG.to_string()));
    if let Some(key) = &ctx.session_key {
        info.insert("session_key".to_string(), Value::String(key.clone()));
    }
    if let Some(agent) = &ctx.agent_id {
        info.insert("agent_id".to_string(), Value::String(agent.clone()));
    }
    for (key, value) in &config.info {
        info.insert(key.clone(), value.clone());
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capture_config(include_assistant: bool) -> CaptureConfig {
        CaptureConfig {
            include_assistant,
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn test_last_turn_without_assistant() {
        let messages = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("what's the weather"),
        ];
        let selected = select_messages(&messages, &capture_config(false));
        assert_eq!(
            selected,
            vec![CapturedMessage::new(MessageRole::User, "what's the weather")]
        );
    }

    #[test]
    fn test_last_turn_includes_trailing_assistant() {
        let messages = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("weather?"),
            ChatMessage::assistant("sunny"),
        ];
        let selected = select_messages(&messages, &capture_config(true));
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[1], CapturedMessage::new(MessageRole::Assistant, "sunny"));
    }

    #[test]
    fn test_last_turn_without_user_message_is_empty() {
        let messages = vec![ChatMessage::assistant("hello")];
        assert!(select_messages(&messages, &capture_config(true)).is_empty());
    }

    #[test]
    fn test_full_session_applies_same_rules() {
        let messages = vec![
            ChatMessage::user("one"),
            ChatMessage::assistant("two"),
            ChatMessage {
                role: MessageRole::Tool,
                content: crate::memory::core::event::MessageContent::Text("tool".to_string()),
            },
            ChatMessage::user("   "),
            ChatMessage::user("three"),
        ];
        let config = CaptureConfig {
            strategy: CaptureStrategy::FullSession,
            ..capture_config(true)
        };
        let selected = select_messages(&messages, &config);
        let contents: Vec<&str> = selected.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_injected_context_is_stripped() {
        let injected = format!("<memories>old stuff</memories>\n{QUERY_MARKER}  real question ");
        let messages = vec![ChatMessage::user(injected)];
        let selected = select_messages(&messages, &capture_config(false));
        assert_eq!(selected[0].content, "real question");
    }

    #[test]
    fn test_truncation_appends_ellipsis() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("abc", 0), "abc");
    }

    #[test]
    fn test_payload_info_and_ids() {
        let mut config = EffectiveConfig::default();
        config.capture.info.insert("source".to_string(), json!("custom"));
        config.capture.info.insert("team".to_string(), json!("core"));
        config.capture.app_id = Some("app".to_string());
        let resolver = ConversationResolver::new();
        let ctx = SessionContext {
            session_key: Some("s1".to_string()),
            agent_id: Some("main".to_string()),
            ..SessionContext::default()
        };
        let event = LifecycleEvent::with_messages(vec![ChatMessage::user("hello")]);

        let payload = build_append_payload(&config, &resolver, &event, &ctx).unwrap();
        assert_eq!(payload.conversation_id, "s1");
        assert_eq!(payload.agent_id.as_deref(), Some("main"));
        assert_eq!(payload.info["source"], json!("custom"));
        assert_eq!(payload.info["session_key"], json!("s1"));
        assert_eq!(payload.info["team"], json!("core"));

        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(wire["messages"], json!([{ "role": "user", "content": "hello" }]));
        assert_eq!(wire["app_id"], json!("app"));
        assert_eq!(wire["async_mode"], json!(true));
    }

    #[test]
    fn test_payload_none_when_nothing_selected() {
        let config = EffectiveConfig::default();
        let resolver = ConversationResolver::new();
        let event = LifecycleEvent::default();
        assert!(build_append_payload(&config, &resolver, &event, &SessionContext::default()).is_none());
    }
}
