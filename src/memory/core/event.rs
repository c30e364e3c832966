//! Host lifecycle events and session identity.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::memory::core::config::parse_bool;

/// Role of a chat message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// User input.
    User,
    /// Assistant response.
    Assistant,
    /// Tool output.
    Tool,
    /// System message.
    System,
    /// Anything the host invents later.
    #[default]
    #[serde(other)]
    Other,
}

impl MessageRole {
    /// Stable string form for the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::System => "system",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            "system" => Ok(Self::System),
            _ => Err(value.to_string()),
        }
    }
}

/// One structured content part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// Part type (`text`, `image`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Text payload for text parts.
    #[serde(default)]
    pub text: Option<String>,
}

/// Message content: plain text or a list of parts.
///
/// Any other shape (null, numbers, objects) reads as empty text.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Structured parts; only text parts carry content.
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::Parts(
                items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect(),
            ),
            _ => Self::default(),
        })
    }
}

impl MessageContent {
    /// Flatten to plain text, joining text parts with newlines.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter(|part| part.kind == "text" || part.kind.is_empty())
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single message of a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role; missing or malformed reads as [`MessageRole::Other`].
    #[serde(default, deserialize_with = "default_on_invalid")]
    pub role: MessageRole,
    /// Content payload.
    #[serde(default)]
    pub content: MessageContent,
}

impl ChatMessage {
    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Plain text of the message.
    #[must_use]
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// Turn-start or turn-end notification from the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleEvent {
    /// Messages of the turn, oldest first.
    #[serde(deserialize_with = "lenient_messages")]
    pub messages: Vec<ChatMessage>,
    /// Prompt text for turn-start events.
    #[serde(deserialize_with = "default_on_invalid")]
    pub prompt: Option<String>,
    /// Whether the turn finished successfully (turn-end only).
    #[serde(deserialize_with = "lenient_bool")]
    pub success: Option<bool>,
    /// Explicit heartbeat flag.
    #[serde(deserialize_with = "lenient_bool")]
    pub is_heartbeat: Option<bool>,
    /// Event type tag.
    #[serde(rename = "type", deserialize_with = "default_on_invalid")]
    pub kind: Option<String>,
    /// Event source tag.
    #[serde(deserialize_with = "default_on_invalid")]
    pub source: Option<String>,
    /// Opaque host metadata.
    pub metadata: Option<Value>,
}

impl LifecycleEvent {
    /// Event carrying just a prompt.
    #[must_use]
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Event carrying a message sequence.
    #[must_use]
    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// The most recent user-authored message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
    }
}

/// Host-supplied session and agent identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionContext {
    /// Stable session key.
    #[serde(deserialize_with = "lenient_string")]
    pub session_key: Option<String>,
    /// Session id.
    #[serde(deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    /// Agent id.
    #[serde(deserialize_with = "lenient_string")]
    pub agent_id: Option<String>,
    /// Trigger type tag.
    #[serde(rename = "type", deserialize_with = "default_on_invalid")]
    pub kind: Option<String>,
    /// Trigger source tag.
    #[serde(deserialize_with = "default_on_invalid")]
    pub source: Option<String>,
}

impl SessionContext {
    /// Context with only a session key.
    #[must_use]
    pub fn for_session(session_key: impl Into<String>) -> Self {
        Self {
            session_key: Some(session_key.into()),
            ..Self::default()
        }
    }
}

/// Deserialize `T`, falling back to its default when the value has the wrong shape.
pub(crate) fn default_on_invalid<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(parse_bool(&Value::deserialize(deserializer)?))
}

/// Ids may arrive as numbers; keep them as their decimal text.
fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Drops entries that are not message objects instead of rejecting the turn.
fn lenient_messages<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ChatMessage>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}
