//! Conversation identity resolution.
//!
//! The conversation id groups recalled and captured memories at the remote
//! store. It is `prefix + base + dynamic suffix + suffix`, unless the config
//! pins an explicit id.

use std::sync::OnceLock;

use chrono::Utc;
use dashmap::DashMap;

use crate::memory::core::config::{ConversationConfig, SOURCE_TAG, SuffixMode};
use crate::memory::core::event::SessionContext;

/// Counter key used when the host supplies no session identity.
const DEFAULT_COUNTER_KEY: &str = "default";

/// Per-session conversation counters.
///
/// Keys are created lazily and never removed for the lifetime of the owner.
#[derive(Debug, Default)]
pub struct ConversationCounters {
    counts: DashMap<String, u64>,
}

impl ConversationCounters {
    /// Create an empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for a session, creating the entry on first sight.
    #[must_use]
    pub fn current(&self, key: &str) -> u64 {
        *self.counts.entry(key.to_string()).or_insert(0)
    }

    /// Start a new conversation for the session; returns the new count.
    pub fn bump(&self, key: &str) -> u64 {
        let mut entry = self.counts.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Number of tracked sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no session has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Derives stable conversation ids from session identity.
#[derive(Debug, Default)]
pub struct ConversationResolver {
    counters: ConversationCounters,
    synthetic: OnceLock<String>,
}

impl ConversationResolver {
    /// Create a resolver with fresh counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter set backing the dynamic suffix.
    #[must_use]
    pub const fn counters(&self) -> &ConversationCounters {
        &self.counters
    }

    /// Resolve the conversation id for a context.
    ///
    /// Repeated calls return the same id until [`Self::start_new_conversation`]
    /// bumps the session's counter.
    #[must_use]
    pub fn resolve(&self, config: &ConversationConfig, ctx: &SessionContext) -> String {
        if let Some(pinned) = config.conversation_id.as_deref() {
            return pinned.to_string();
        }

        let base = self.base_id(ctx);
        let count = self.counters.current(&counter_key(ctx));
        let dynamic = match config.suffix_mode {
            SuffixMode::Counter if count > 0 => format!("#{count}"),
            _ => String::new(),
        };

        format!("{}{base}{dynamic}{}", config.prefix, config.suffix)
    }

    /// Register a "new conversation" signal for the session.
    pub fn start_new_conversation(&self, ctx: &SessionContext) -> u64 {
        self.counters.bump(&counter_key(ctx))
    }

    fn base_id(&self, ctx: &SessionContext) -> String {
        if let Some(key) = non_empty(ctx.session_key.as_deref()) {
            return key.to_string();
        }
        if let Some(id) = non_empty(ctx.session_id.as_deref()) {
            return id.to_string();
        }
        if let Some(agent) = non_empty(ctx.agent_id.as_deref()) {
            return format!("agent-{agent}");
        }
        self.synthetic
            .get_or_init(|| format!("{SOURCE_TAG}-{}", Utc::now().timestamp_millis()))
            .clone()
    }
}

fn counter_key(ctx: &SessionContext) -> String {
    non_empty(ctx.session_key.as_deref())
        .or_else(|| non_empty(ctx.session_id.as_deref()))
        .unwrap_or(DEFAULT_COUNTER_KEY)
        .to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_config() -> ConversationConfig {
        ConversationConfig {
            suffix_mode: SuffixMode::Counter,
            ..ConversationConfig::default()
        }
    }

    #[test]
    fn test_pinned_id_wins() {
        let resolver = ConversationResolver::new();
        let config = ConversationConfig {
            conversation_id: Some("fixed".to_string()),
            prefix: "p-".to_string(),
            ..counter_config()
        };
        let ctx = SessionContext::for_session("s1");
        resolver.start_new_conversation(&ctx);
        assert_eq!(resolver.resolve(&config, &ctx), "fixed");
    }

    #[test]
    fn test_base_fallback_order() {
        let resolver = ConversationResolver::new();
        let config = ConversationConfig::default();

        let ctx = SessionContext {
            session_key: Some("key".to_string()),
            session_id: Some("id".to_string()),
            agent_id: Some("agent".to_string()),
            ..SessionContext::default()
        };
        assert_eq!(resolver.resolve(&config, &ctx), "key");

        let ctx = SessionContext {
            session_id: Some("id".to_string()),
            agent_id: Some("agent".to_string()),
            ..SessionContext::default()
        };
        assert_eq!(resolver.resolve(&config, &ctx), "id");

        let ctx = SessionContext {
            agent_id: Some("main".to_string()),
            ..SessionContext::default()
        };
        assert_eq!(resolver.resolve(&config, &ctx), "agent-main");
    }

    #[test]
    fn test_synthetic_id_is_stable() {
        let resolver = ConversationResolver::new();
        let config = ConversationConfig::default();
        let ctx = SessionContext::default();
        let first = resolver.resolve(&config, &ctx);
        assert!(first.starts_with("openclaw-"));
        assert_eq!(first, resolver.resolve(&config, &ctx));
    }

    #[test]
    fn test_counter_suffix_is_monotonic() {
        let resolver = ConversationResolver::new();
        let config = ConversationConfig {
            prefix: "oc:".to_string(),
            suffix: ":x".to_string(),
            ..counter_config()
        };
        let ctx = SessionContext::for_session("s1");

        let first = resolver.resolve(&config, &ctx);
        assert_eq!(first, "oc:s1:x");
        assert_eq!(first, resolver.resolve(&config, &ctx));

        resolver.start_new_conversation(&ctx);
        assert_eq!(resolver.resolve(&config, &ctx), "oc:s1#1:x");
        resolver.start_new_conversation(&ctx);
        assert_eq!(resolver.resolve(&config, &ctx), "oc:s1#2:x");
    }

    #[test]
    fn test_counter_ignored_without_counter_mode() {
        let resolver = ConversationResolver::new();
        let ctx = SessionContext::for_session("s1");
        resolver.start_new_conversation(&ctx);
        assert_eq!(resolver.resolve(&ConversationConfig::default(), &ctx), "s1");
    }

    #[test]
    fn test_counters_are_per_session() {
        let resolver = ConversationResolver::new();
        let config = counter_config();
        let a = SessionContext::for_session("a");
        let b = SessionContext::for_session("b");
        resolver.start_new_conversation(&a);
        assert_eq!(resolver.resolve(&config, &a), "a#1");
        assert_eq!(resolver.resolve(&config, &b), "b");
        assert_eq!(resolver.counters().len(), 2);
    }
}
