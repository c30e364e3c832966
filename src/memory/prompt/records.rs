//! Memory service response parsing.

use chrono::DateTime;
use serde_json::Value;

/// Epoch values above this are treated as milliseconds.
const MILLIS_THRESHOLD: f64 = 1e12;

const FACT_TEXT_FIELDS: [&str; 3] = ["memory_value", "memory", "content"];
const PREFERENCE_TEXT_FIELDS: [&str; 3] = ["preference", "memory_value", "content"];
const TIME_FIELDS: [&str; 3] = ["create_time", "update_time", "timestamp"];

/// One raw record from the service.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryRecord {
    /// Record text, uncleaned.
    pub text: String,
    /// Creation time as sent (number or numeric string).
    pub time: Option<Value>,
    /// Preference type tag, for preference records.
    pub preference_type: Option<String>,
}

/// Parsed search response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecallResult {
    /// Fact records.
    pub facts: Vec<MemoryRecord>,
    /// Preference records.
    pub preferences: Vec<MemoryRecord>,
    /// Tool-memory records.
    pub tool_memories: Vec<MemoryRecord>,
    /// Free-form preference note.
    pub preference_note: Option<String>,
}

impl RecallResult {
    /// Parse a raw response, unwrapping the transport envelope.
    ///
    /// Returns `None` when there is no usable payload.
    #[must_use]
    pub fn from_response(raw: &Value) -> Option<Self> {
        let payload = unwrap_envelope(raw)?;
        Some(Self {
            facts: read_records(payload, "memory_detail_list", &FACT_TEXT_FIELDS),
            preferences: read_records(payload, "preference_detail_list", &PREFERENCE_TEXT_FIELDS),
            tool_memories: read_records(payload, "tool_memory_detail_list", &FACT_TEXT_FIELDS),
            preference_note: payload
                .get("preference_note")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|note| !note.is_empty())
                .map(ToString::to_string),
        })
    }

    /// Total number of records of every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len() + self.preferences.len() + self.tool_memories.len()
    }

    /// Whether no record was returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The `data` object of an envelope, or the object itself.
#[must_use]
pub fn unwrap_envelope(raw: &Value) -> Option<&Value> {
    match raw.get("data") {
        Some(data) if data.is_object() => Some(data),
        Some(_) => None,
        None => raw.is_object().then_some(raw),
    }
}

fn read_records(payload: &Value, list: &str, text_fields: &[&str]) -> Vec<MemoryRecord> {
    payload
        .get(list)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|item| read_record(item, text_fields)).collect())
        .unwrap_or_default()
}

fn read_record(item: &Value, text_fields: &[&str]) -> Option<MemoryRecord> {
    if let Some(text) = item.as_str() {
        return Some(MemoryRecord {
            text: text.to_string(),
            ..MemoryRecord::default()
        });
    }

    let text = text_fields
        .iter()
        .find_map(|field| item.get(*field).and_then(Value::as_str))?;
    let time = TIME_FIELDS
        .iter()
        .find_map(|field| item.get(*field).filter(|v| !v.is_null()))
        .cloned();
    let preference_type = item
        .get("preference_type")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Some(MemoryRecord {
        text: text.to_string(),
        time,
        preference_type,
    })
}

/// Render an epoch (seconds or millis, number or numeric string).
///
/// Unparseable input renders as an empty string.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_timestamp(value: &Value) -> String {
    let epoch = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(epoch) = epoch.filter(|e| e.is_finite() && *e > 0.0) else {
        return String::new();
    };

    let millis = if epoch > MILLIS_THRESHOLD {
        epoch
    } else {
        epoch * 1000.0
    };

    DateTime::from_timestamp_millis(millis as i64)
        .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Normalize a preference type tag into a display label.
#[must_use]
pub fn preference_label(kind: Option<&str>) -> String {
    let Some(kind) = kind.map(str::trim).filter(|k| !k.is_empty()) else {
        return "Other".to_string();
    };
    let lower = kind.to_ascii_lowercase();
    if lower.contains("explicit") {
        return "Explicit".to_string();
    }
    if lower.contains("implicit") {
        return "Implicit".to_string();
    }
    title_case(kind)
}

fn title_case(text: &str) -> String {
    text.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
