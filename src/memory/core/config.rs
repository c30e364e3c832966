//! Configuration for the memory bridge.
//!
//! [`resolve_config`] merges, per key, runtime overrides, the static plugin
//! config, discovered environment values and built-in defaults (in that
//! order). Numeric limits are clamped to fixed windows and anything that does
//! not parse falls back to the default instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::memory::core::env::EnvProvider;

/// Default memory service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://memos.memtensor.cn/api/openmem/v1";
/// Default user id sent to the memory service.
pub const DEFAULT_USER_ID: &str = "openclaw-user";
/// Source tag attached to every request.
pub const SOURCE_TAG: &str = "openclaw";
/// Default heartbeat sentinel strings.
pub const DEFAULT_HEARTBEAT_KEYWORDS: [&str; 2] = ["HEARTBEAT_OK", "Read HEARTBEAT.md"];

/// Path of the recall endpoint, relative to the base URL.
pub const SEARCH_PATH: &str = "/search/memory";
/// Path of the capture endpoint, relative to the base URL.
pub const ADD_PATH: &str = "/add/message";

/// A clamped numeric setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumericLimit {
    /// Config key (camelCase).
    pub key: &'static str,
    /// Inclusive lower bound.
    pub min: u64,
    /// Inclusive upper bound.
    pub max: u64,
    /// Value used when the input is missing or invalid.
    pub default: u64,
}

impl NumericLimit {
    const fn new(key: &'static str, min: u64, max: u64, default: u64) -> Self {
        Self {
            key,
            min,
            max,
            default,
        }
    }

    /// Parse and range-check a raw value.
    #[must_use]
    pub fn check(&self, raw: &Value) -> Option<u64> {
        parse_number(raw).filter(|value| (self.min..=self.max).contains(value))
    }

    /// Parse a raw value, falling back to the default.
    #[must_use]
    pub fn read(&self, raw: Option<&Value>) -> u64 {
        raw.and_then(|value| self.check(value))
            .unwrap_or(self.default)
    }
}

/// Max facts per recall.
pub const MEMORY_LIMIT: NumericLimit = NumericLimit::new("memoryLimitNumber", 1, 25, 6);
/// Max preferences per recall.
pub const PREFERENCE_LIMIT: NumericLimit = NumericLimit::new("preferenceLimitNumber", 0, 25, 6);
/// Max tool memories per recall.
pub const TOOL_MEMORY_LIMIT: NumericLimit = NumericLimit::new("toolMemoryLimitNumber", 1, 25, 6);
/// Per-attempt timeout in milliseconds.
pub const TIMEOUT_MS: NumericLimit = NumericLimit::new("timeoutMs", 50, 60_000, 5_000);
/// Additional attempts after the first one.
pub const RETRIES: NumericLimit = NumericLimit::new("retries", 0, 5, 1);
/// Max chars per captured message.
pub const MAX_MESSAGE_CHARS: NumericLimit = NumericLimit::new("maxMessageChars", 200, 100_000, 20_000);
/// Max chars of the recall query (0 = unlimited).
pub const MAX_QUERY_CHARS: NumericLimit = NumericLimit::new("maxQueryChars", 0, 20_000, 0);
/// Max chars per rendered memory item (0 = unlimited).
pub const MAX_ITEM_CHARS: NumericLimit = NumericLimit::new("maxItemChars", 0, 10_000, 0);
/// Minimum spacing between captures.
pub const CAPTURE_THROTTLE_MS: NumericLimit =
    NumericLimit::new("captureThrottleMs", 0, 3_600_000, 0);
/// Dashboard listen port.
pub const DASHBOARD_PORT: NumericLimit = NumericLimit::new("dashboardPort", 1024, 65_535, 38_463);
/// Telemetry snapshot interval.
pub const FLUSH_INTERVAL_SECS: NumericLimit =
    NumericLimit::new("statsFlushIntervalSecs", 5, 3_600, 30);

/// Limits checked when the dashboard submits overrides.
pub const VALIDATED_LIMITS: [NumericLimit; 7] = [
    DASHBOARD_PORT,
    MEMORY_LIMIT,
    PREFERENCE_LIMIT,
    TOOL_MEMORY_LIMIT,
    TIMEOUT_MS,
    RETRIES,
    MAX_MESSAGE_CHARS,
];

/// How captured messages are selected from a finished turn.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStrategy {
    /// Last user message and everything after it.
    #[default]
    LastTurn,
    /// Every message of the turn.
    FullSession,
}

impl CaptureStrategy {
    fn parse(raw: Option<&Value>) -> Self {
        match raw.and_then(Value::as_str).map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "full_session" || s == "full-session" => Self::FullSession,
            _ => Self::LastTurn,
        }
    }
}

/// Dynamic suffix appended to conversation ids.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuffixMode {
    /// No dynamic suffix.
    #[default]
    None,
    /// `#<n>` once the session counter is above zero.
    Counter,
}

impl SuffixMode {
    fn parse(raw: Option<&Value>) -> Self {
        match raw.and_then(Value::as_str).map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("counter") => Self::Counter,
            _ => Self::None,
        }
    }
}

/// Resolved, immutable settings for one bridge instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    /// Remote service settings.
    pub service: ServiceConfig,
    /// Conversation identity settings.
    pub conversation: ConversationConfig,
    /// Recall settings.
    pub recall: RecallConfig,
    /// Capture settings.
    pub capture: CaptureConfig,
    /// Heartbeat filter settings.
    pub heartbeat: HeartbeatConfig,
    /// Prompt rendering settings.
    pub prompt: PromptConfig,
    /// Observability settings.
    pub dashboard: DashboardConfig,
}

impl EffectiveConfig {
    /// Full URL of the recall endpoint.
    #[must_use]
    pub fn search_url(&self) -> String {
        join_url(&self.service.base_url, SEARCH_PATH)
    }

    /// Full URL of the capture endpoint.
    #[must_use]
    pub fn add_url(&self) -> String {
        join_url(&self.service.base_url, ADD_PATH)
    }

    /// JSON view with the API key masked.
    #[must_use]
    pub fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(service) = value.get_mut("service").and_then(Value::as_object_mut) {
            let masked = self.service.api_key.as_deref().map(mask_secret);
            service.insert(
                "apiKey".to_string(),
                masked.map_or(Value::Null, Value::String),
            );
        }
        value
    }
}

/// Remote service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Base URL of the memory service.
    pub base_url: String,
    /// Bearer credential.
    pub api_key: Option<String>,
    /// User id sent with every request.
    pub user_id: String,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    /// Additional attempts after the first.
    pub retries: u32,
}

impl Default for ServiceConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            user_id: DEFAULT_USER_ID.to_string(),
            timeout_ms: TIMEOUT_MS.default,
            retries: RETRIES.default as u32,
        }
    }
}

/// Conversation identity settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    /// Pinned id; overrides everything else.
    pub conversation_id: Option<String>,
    /// Static prefix.
    pub prefix: String,
    /// Static suffix.
    pub suffix: String,
    /// Dynamic suffix mode.
    pub suffix_mode: SuffixMode,
}

/// Recall settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallConfig {
    /// Whether recall runs at all.
    pub enabled: bool,
    /// Search across conversations instead of the current one.
    pub global: bool,
    /// Text prepended to the query.
    pub query_prefix: String,
    /// Max query chars (0 = unlimited).
    pub max_query_chars: usize,
    /// Max facts returned.
    pub memory_limit_number: u32,
    /// Whether preferences are requested.
    pub include_preference: bool,
    /// Max preferences returned.
    pub preference_limit_number: u32,
    /// Whether tool memories are requested.
    pub include_tool_memory: bool,
    /// Max tool memories returned.
    pub tool_memory_limit_number: u32,
    /// Optional search filter.
    pub filter: Option<Value>,
    /// Knowledge bases to scope the search to.
    pub knowledgebase_ids: Vec<String>,
}

impl Default for RecallConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            enabled: true,
            global: false,
            query_prefix: String::new(),
            max_query_chars: MAX_QUERY_CHARS.default as usize,
            memory_limit_number: MEMORY_LIMIT.default as u32,
            include_preference: true,
            preference_limit_number: PREFERENCE_LIMIT.default as u32,
            include_tool_memory: false,
            tool_memory_limit_number: TOOL_MEMORY_LIMIT.default as u32,
            filter: None,
            knowledgebase_ids: Vec::new(),
        }
    }
}

/// Capture settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Whether capture runs at all.
    pub enabled: bool,
    /// Message selection strategy.
    pub strategy: CaptureStrategy,
    /// Whether assistant replies are captured.
    pub include_assistant: bool,
    /// Max chars per captured message.
    pub max_message_chars: usize,
    /// Minimum spacing between captures.
    pub throttle_ms: u64,
    /// Tags attached to captured messages.
    pub tags: Vec<String>,
    /// Optional agent id.
    pub agent_id: Option<String>,
    /// Optional app id.
    pub app_id: Option<String>,
    /// Extra info fields, overlaid on the base info map.
    pub info: Map<String, Value>,
    /// Let the service process the append asynchronously.
    pub async_mode: bool,
    /// Mark captured memories as public.
    pub allow_public: bool,
}

impl Default for CaptureConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CaptureStrategy::LastTurn,
            include_assistant: true,
            max_message_chars: MAX_MESSAGE_CHARS.default as usize,
            throttle_ms: CAPTURE_THROTTLE_MS.default,
            tags: vec![SOURCE_TAG.to_string()],
            agent_id: None,
            app_id: None,
            info: Map::new(),
            async_mode: true,
            allow_public: false,
        }
    }
}

/// Heartbeat filter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    /// Whether heartbeat filtering is active.
    pub enabled: bool,
    /// Sentinel strings marking a heartbeat turn.
    pub keywords: Vec<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: DEFAULT_HEARTBEAT_KEYWORDS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Prompt rendering settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptConfig {
    /// Custom template; wins over every other style.
    pub template: Option<String>,
    /// Use the short directive prompt.
    pub compact: bool,
    /// Prefix items with their creation time.
    pub include_timestamps: bool,
    /// Max chars per item (0 = unlimited).
    pub max_item_chars: usize,
}

impl Default for PromptConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            template: None,
            compact: false,
            include_timestamps: true,
            max_item_chars: MAX_ITEM_CHARS.default as usize,
        }
    }
}

/// Observability settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    /// Listen port for the stats API.
    pub port: u16,
    /// Seconds between telemetry snapshots.
    pub flush_interval_secs: u64,
}

impl Default for DashboardConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            port: DASHBOARD_PORT.default as u16,
            flush_interval_secs: FLUSH_INTERVAL_SECS.default,
        }
    }
}

/// Layered raw-value lookup.
struct Layers<'a> {
    overrides: &'a Map<String, Value>,
    plugin: Option<&'a Map<String, Value>>,
    env: &'a dyn EnvProvider,
}

impl Layers<'_> {
    fn raw(&self, key: &str, env_key: Option<&str>) -> Option<Value> {
        if let Some(value) = self.overrides.get(key).filter(|v| is_present(v)) {
            return Some(value.clone());
        }
        if let Some(value) = self
            .plugin
            .and_then(|plugin| plugin.get(key))
            .filter(|v| is_present(v))
        {
            return Some(value.clone());
        }
        env_key
            .and_then(|k| self.env.get(k))
            .filter(|v| !v.trim().is_empty())
            .map(Value::String)
    }

    fn string(&self, key: &str, env_key: Option<&str>) -> Option<String> {
        self.raw(key, env_key).as_ref().and_then(read_string)
    }

    fn flag(&self, key: &str, env_key: Option<&str>, default: bool) -> bool {
        read_bool(self.raw(key, env_key).as_ref(), default)
    }

    fn number(&self, limit: NumericLimit, env_key: Option<&str>) -> u64 {
        limit.read(self.raw(limit.key, env_key).as_ref())
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.raw(key, None).as_ref().and_then(read_list)
    }

    fn object(&self, key: &str) -> Option<Map<String, Value>> {
        self.raw(key, None)
            .and_then(|value| value.as_object().cloned())
    }
}

/// Resolve the effective configuration.
///
/// Pure apart from the lookups performed on `env`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn resolve_config(
    plugin: &Value,
    env: &dyn EnvProvider,
    overrides: &Map<String, Value>,
) -> EffectiveConfig {
    let layers = Layers {
        overrides,
        plugin: plugin.as_object(),
        env,
    };

    let base_url = layers
        .string("baseUrl", Some("MEMOS_BASE_URL"))
        .filter(|url| Url::parse(url).is_ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let service = ServiceConfig {
        base_url,
        api_key: layers.string("apiKey", Some("MEMOS_API_KEY")),
        user_id: layers
            .string("userId", Some("MEMOS_USER_ID"))
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        timeout_ms: layers.number(TIMEOUT_MS, Some("MEMOS_TIMEOUT_MS")),
        retries: layers.number(RETRIES, Some("MEMOS_RETRIES")) as u32,
    };

    let conversation = ConversationConfig {
        conversation_id: layers.string("conversationId", Some("MEMOS_CONVERSATION_ID")),
        prefix: layers.string("conversationIdPrefix", None).unwrap_or_default(),
        suffix: layers.string("conversationIdSuffix", None).unwrap_or_default(),
        suffix_mode: SuffixMode::parse(layers.raw("conversationSuffixMode", None).as_ref()),
    };

    let recall = RecallConfig {
        enabled: layers.flag("recallEnabled", Some("MEMOS_RECALL_ENABLED"), true),
        global: layers.flag("recallGlobal", Some("MEMOS_RECALL_GLOBAL"), false),
        query_prefix: layers.string("queryPrefix", None).unwrap_or_default(),
        max_query_chars: layers.number(MAX_QUERY_CHARS, None) as usize,
        memory_limit_number: layers.number(MEMORY_LIMIT, None) as u32,
        include_preference: layers.flag("includePreference", None, true),
        preference_limit_number: layers.number(PREFERENCE_LIMIT, None) as u32,
        include_tool_memory: layers.flag("includeToolMemory", None, false),
        tool_memory_limit_number: layers.number(TOOL_MEMORY_LIMIT, None) as u32,
        filter: layers.object("filter").map(Value::Object),
        knowledgebase_ids: layers.list("knowledgebaseIds").unwrap_or_default(),
    };

    let capture = CaptureConfig {
        enabled: layers.flag("addEnabled", Some("MEMOS_ADD_ENABLED"), true),
        strategy: CaptureStrategy::parse(layers.raw("captureStrategy", None).as_ref()),
        include_assistant: layers.flag("includeAssistant", None, true),
        max_message_chars: layers.number(MAX_MESSAGE_CHARS, None) as usize,
        throttle_ms: layers.number(CAPTURE_THROTTLE_MS, None),
        tags: layers
            .list("tags")
            .unwrap_or_else(|| vec![SOURCE_TAG.to_string()]),
        agent_id: layers.string("agentId", None),
        app_id: layers.string("appId", None),
        info: layers.object("info").unwrap_or_default(),
        async_mode: layers.flag("asyncMode", None, true),
        allow_public: layers.flag("allowPublic", None, false),
    };

    let heartbeat = HeartbeatConfig {
        enabled: layers.flag("heartbeatFilter", None, true),
        keywords: layers
            .list("heartbeatKeywords")
            .filter(|keywords| !keywords.is_empty())
            .unwrap_or_else(|| HeartbeatConfig::default().keywords),
    };

    let prompt = PromptConfig {
        template: layers.string("promptTemplate", None),
        compact: layers.flag("compactPrompt", None, false),
        include_timestamps: layers.flag("includeTimestamps", None, true),
        max_item_chars: layers.number(MAX_ITEM_CHARS, None) as usize,
    };

    let dashboard = DashboardConfig {
        port: layers.number(DASHBOARD_PORT, Some("MEMOS_DASHBOARD_PORT")) as u16,
        flush_interval_secs: layers.number(FLUSH_INTERVAL_SECS, None),
    };

    EffectiveConfig {
        service,
        conversation,
        recall,
        capture,
        heartbeat,
        prompt,
        dashboard,
    }
}

/// Check dashboard-submitted overrides against the documented windows.
///
/// Returns one message per offending key; empty means valid.
#[must_use]
pub fn validate_overrides(update: &Map<String, Value>) -> Vec<String> {
    VALIDATED_LIMITS
        .iter()
        .filter_map(|limit| {
            let value = update.get(limit.key).filter(|v| is_present(v))?;
            if limit.check(value).is_some() {
                None
            } else {
                Some(format!(
                    "{} must be between {} and {}",
                    limit.key, limit.min, limit.max
                ))
            }
        })
        .collect()
}

/// Merge an override update into the current set; `null` removes a key.
#[must_use]
pub fn merge_overrides(
    current: &Map<String, Value>,
    update: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = current.clone();
    for (key, value) in update {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Parse the fixed truthy/falsy vocabulary.
#[must_use]
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => Some(true),
            "0" | "false" | "no" | "n" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse a boolean, falling back to `default`.
#[must_use]
pub fn read_bool(value: Option<&Value>, default: bool) -> bool {
    value.and_then(parse_bool).unwrap_or(default)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn parse_number(value: &Value) -> Option<u64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    Some(number.floor() as u64)
}

fn read_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn read_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(read_string).collect()),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(ToString::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn is_present(value: &Value) -> bool {
    !value.is_null()
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}***")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::env::MapEnvProvider;
    use serde_json::json;

    fn resolve(plugin: &Value, env: &MapEnvProvider, overrides: &Value) -> EffectiveConfig {
        let overrides = overrides.as_object().cloned().unwrap_or_default();
        resolve_config(plugin, env, &overrides)
    }

    #[test]
    fn test_defaults() {
        let config = resolve(&json!({}), &MapEnvProvider::new(), &json!({}));
        assert_eq!(config.service.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.service.user_id, DEFAULT_USER_ID);
        assert!(config.service.api_key.is_none());
        assert_eq!(config.service.timeout_ms, 5_000);
        assert_eq!(config.service.retries, 1);
        assert_eq!(config.recall.memory_limit_number, 6);
        assert_eq!(config.capture.tags, vec!["openclaw".to_string()]);
        assert_eq!(config.capture.strategy, CaptureStrategy::LastTurn);
        assert_eq!(config.heartbeat.keywords.len(), 2);
        assert_eq!(config.dashboard.port, 38_463);
    }

    #[test]
    fn test_section_defaults_match_resolved_defaults() {
        let resolved = resolve(&json!({}), &MapEnvProvider::new(), &json!({}));
        let defaults = EffectiveConfig::default();
        assert_eq!(
            serde_json::to_value(&defaults).unwrap(),
            serde_json::to_value(&resolved).unwrap()
        );
        assert_eq!(u64::from(defaults.service.retries), RETRIES.default);
        assert_eq!(u64::from(defaults.dashboard.port), DASHBOARD_PORT.default);
        assert_eq!(
            u64::try_from(defaults.capture.max_message_chars).unwrap(),
            MAX_MESSAGE_CHARS.default
        );
    }

    #[test]
    fn test_precedence() {
        let env = MapEnvProvider::new()
            .with("MEMOS_API_KEY", "env-key")
            .with("MEMOS_USER_ID", "env-user")
            .with("MEMOS_TIMEOUT_MS", "9000");
        let plugin = json!({ "userId": "plugin-user", "timeoutMs": 7000 });
        let overrides = json!({ "timeoutMs": 1000 });

        let config = resolve(&plugin, &env, &overrides);
        assert_eq!(config.service.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.service.user_id, "plugin-user");
        assert_eq!(config.service.timeout_ms, 1000);
    }

    #[test]
    fn test_out_of_range_falls_back_to_default() {
        let plugin = json!({
            "memoryLimitNumber": 500,
            "retries": "lots",
            "timeoutMs": "1500",
            "maxMessageChars": -3
        });
        let config = resolve(&plugin, &MapEnvProvider::new(), &json!({}));
        assert_eq!(config.recall.memory_limit_number, 6);
        assert_eq!(config.service.retries, 1);
        assert_eq!(config.service.timeout_ms, 1500);
        assert_eq!(config.capture.max_message_chars, 20_000);
    }

    #[test]
    fn test_bool_vocabulary() {
        for truthy in ["1", "true", "YES", "y", " on "] {
            assert_eq!(parse_bool(&json!(truthy)), Some(true), "{truthy}");
        }
        for falsy in ["0", "false", "No", "n", "off"] {
            assert_eq!(parse_bool(&json!(falsy)), Some(false), "{falsy}");
        }
        assert_eq!(parse_bool(&json!("maybe")), None);
        assert!(read_bool(Some(&json!("maybe")), true));
        assert!(!read_bool(Some(&json!("maybe")), false));
        assert!(read_bool(None, true));
    }

    #[test]
    fn test_env_bool_and_invalid_url() {
        let env = MapEnvProvider::new()
            .with("MEMOS_RECALL_GLOBAL", "yes")
            .with("MEMOS_BASE_URL", "not a url");
        let config = resolve(&json!({}), &env, &json!({}));
        assert!(config.recall.global);
        assert_eq!(config.service.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_lists_and_enums() {
        let plugin = json!({
            "tags": "a, b,,c",
            "heartbeatKeywords": ["PING"],
            "captureStrategy": "full_session",
            "conversationSuffixMode": "Counter"
        });
        let config = resolve(&plugin, &MapEnvProvider::new(), &json!({}));
        assert_eq!(config.capture.tags, vec!["a", "b", "c"]);
        assert_eq!(config.heartbeat.keywords, vec!["PING"]);
        assert_eq!(config.capture.strategy, CaptureStrategy::FullSession);
        assert_eq!(config.conversation.suffix_mode, SuffixMode::Counter);
    }

    #[test]
    fn test_urls() {
        let plugin = json!({ "baseUrl": "https://example.com/api/" });
        let config = resolve(&plugin, &MapEnvProvider::new(), &json!({}));
        assert_eq!(config.search_url(), "https://example.com/api/search/memory");
        assert_eq!(config.add_url(), "https://example.com/api/add/message");
    }

    #[test]
    fn test_validate_overrides() {
        let update = json!({
            "dashboardPort": 80,
            "timeoutMs": 2000,
            "memoryLimitNumber": "x",
            "somethingElse": true
        });
        let errors = validate_overrides(update.as_object().unwrap());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.starts_with("dashboardPort")));
        assert!(errors.iter().any(|e| e.starts_with("memoryLimitNumber")));
    }

    #[test]
    fn test_merge_overrides_null_removes() {
        let current = json!({ "a": 1, "b": 2 });
        let update = json!({ "a": null, "c": 3 });
        let merged = merge_overrides(current.as_object().unwrap(), update.as_object().unwrap());
        assert_eq!(Value::Object(merged), json!({ "b": 2, "c": 3 }));
    }

    #[test]
    fn test_redacted_masks_key() {
        let plugin = json!({ "apiKey": "secret-token" });
        let config = resolve(&plugin, &MapEnvProvider::new(), &json!({}));
        let view = config.redacted();
        assert_eq!(view["service"]["apiKey"], json!("secr***"));
    }
}
