//! Recall search payload construction.

use serde::Serialize;
use serde_json::Value;

use crate::memory::core::config::{EffectiveConfig, RecallConfig, SOURCE_TAG};
use crate::memory::core::event::{ChatMessage, LifecycleEvent, SessionContext};
use crate::memory::core::ids::ConversationResolver;

/// Wire shape of the search request.
#[derive(Clone, Debug, Serialize)]
pub struct SearchPayload {
    /// User id.
    pub user_id: String,
    /// Query text.
    pub query: String,
    /// Conversation scope; absent for global recall.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Source tag.
    pub source: String,
    /// Max facts.
    pub memory_limit_number: u32,
    /// Whether preferences are requested.
    pub include_preference: bool,
    /// Max preferences.
    pub preference_limit_number: u32,
    /// Whether tool memories are requested.
    pub include_tool_memory: bool,
    /// Max tool memories.
    pub tool_memory_limit_number: u32,
    /// Optional filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    /// Knowledge base scope.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub knowledgebase_ids: Vec<String>,
}

/// Text used to query recall: the prompt, else the latest user message.
#[must_use]
pub fn recall_query_text(event: &LifecycleEvent) -> Option<String> {
    event
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .map(ToString::to_string)
        .or_else(|| {
            event
                .last_user_message()
                .map(ChatMessage::text)
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        })
}

/// Prefix and truncate the query text.
#[must_use]
pub fn build_query(config: &RecallConfig, prompt: &str) -> String {
    let query = format!("{}{prompt}", config.query_prefix);
    if config.max_query_chars == 0 {
        return query;
    }
    query.chars().take(config.max_query_chars).collect()
}

/// Build the recall request.
#[must_use]
pub fn build_search_payload(
    config: &EffectiveConfig,
    resolver: &ConversationResolver,
    prompt: &str,
    ctx: &SessionContext,
) -> SearchPayload {
    let recall = &config.recall;
    let conversation_id = if recall.global {
        None
    } else {
        Some(resolver.resolve(&config.conversation, ctx))
    };

    SearchPayload {
        user_id: config.service.user_id.clone(),
        query: build_query(recall, prompt),
        conversation_id,
        source: SOURCE_TAG.to_string(),
        memory_limit_number: recall.memory_limit_number,
        include_preference: recall.include_preference,
        preference_limit_number: recall.preference_limit_number,
        include_tool_memory: recall.include_tool_memory,
        tool_memory_limit_number: recall.tool_memory_limit_number,
        filter: recall.filter.clone(),
        knowledgebase_ids: recall.knowledgebase_ids.clone(),
    }
}
