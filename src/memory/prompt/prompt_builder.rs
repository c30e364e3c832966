//! Prompt block rendering for recalled memories.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::memory::core::config::PromptConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::ingest::capture::truncate_chars;
use crate::memory::prompt::records::{
    MemoryRecord, RecallResult, format_timestamp, preference_label,
};

/// Separates injected memory context from the user's real query.
///
/// Capture relies on this exact token to strip replayed context, so every
/// prompt style ends with it.
pub const QUERY_MARKER: &str = "\u{200b}\u{200b}[user query]\u{200b}\u{200b}";

/// Rendering options.
#[derive(Clone, Debug, Default)]
pub struct FormatOptions {
    /// Custom template; wins over every other style.
    pub template: Option<String>,
    /// Use the short directive prompt.
    pub compact: bool,
    /// Prefix items with their creation time.
    pub include_timestamps: bool,
    /// Max chars per item (0 = unlimited).
    pub max_item_chars: usize,
    /// Clock override for deterministic output.
    pub now: Option<DateTime<Utc>>,
}

impl From<&PromptConfig> for FormatOptions {
    fn from(config: &PromptConfig) -> Self {
        Self {
            template: config.template.clone(),
            compact: config.compact,
            include_timestamps: config.include_timestamps,
            max_item_chars: config.max_item_chars,
            now: None,
        }
    }
}

/// Cleaned lines ready for rendering.
#[derive(Clone, Debug, Default)]
struct MemoryLines {
    facts: Vec<String>,
    preferences: Vec<String>,
    tool_memories: Vec<String>,
    preference_note: Option<String>,
}

/// Renders raw search responses into injectable prompt blocks.
#[derive(Clone, Debug)]
pub struct PromptFormatter {
    line_breaks: Regex,
    placeholders: Regex,
}

impl PromptFormatter {
    /// Compile the formatter's patterns.
    ///
    /// # Errors
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> MemoryResult<Self> {
        Ok(Self {
            line_breaks: Regex::new(r"\s*[\r\n]+\s*")?,
            placeholders: Regex::new(r"\{\{\s*(memories|current_time|query_marker)\s*\}\}")?,
        })
    }

    /// Render a raw response.
    ///
    /// Returns an empty string when the response has no usable payload or no
    /// fact/preference survives cleaning.
    #[must_use]
    pub fn format(&self, raw: &Value, options: &FormatOptions) -> String {
        RecallResult::from_response(raw)
            .map(|result| self.format_result(&result, options))
            .unwrap_or_default()
    }

    /// Render an already parsed result.
    #[must_use]
    pub fn format_result(&self, result: &RecallResult, options: &FormatOptions) -> String {
        let lines = self.clean(result, options);
        if lines.facts.is_empty() && lines.preferences.is_empty() {
            return String::new();
        }

        let block = render_block(&lines);
        let now = options
            .now
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%d %H:%M UTC")
            .to_string();

        if let Some(template) = options.template.as_deref().filter(|t| !t.trim().is_empty()) {
            return self.render_template(template, &block, &now);
        }
        if options.compact {
            return compact_prompt(&block, &now);
        }
        default_prompt(&block, &now)
    }

    fn clean(&self, result: &RecallResult, options: &FormatOptions) -> MemoryLines {
        let facts = result
            .facts
            .iter()
            .filter_map(|record| self.clean_record(record, options, None))
            .collect();
        let preferences = result
            .preferences
            .iter()
            .filter_map(|record| {
                let label = preference_label(record.preference_type.as_deref());
                self.clean_record(record, options, Some(&label))
            })
            .collect();
        let tool_memories = result
            .tool_memories
            .iter()
            .filter_map(|record| self.clean_record(record, options, None))
            .collect();
        let preference_note = result
            .preference_note
            .as_deref()
            .map(|note| self.sanitize(note))
            .filter(|note| !note.is_empty());

        MemoryLines {
            facts,
            preferences,
            tool_memories,
            preference_note,
        }
    }

    fn clean_record(
        &self,
        record: &MemoryRecord,
        options: &FormatOptions,
        label: Option<&str>,
    ) -> Option<String> {
        let text = self.sanitize(&record.text);
        if text.is_empty() {
            return None;
        }
        let text = truncate_chars(&text, options.max_item_chars);

        let mut line = String::from("- ");
        if let Some(label) = label {
            line.push('[');
            line.push_str(label);
            line.push_str("] ");
        }
        if options.include_timestamps {
            let stamp = record.time.as_ref().map(format_timestamp).unwrap_or_default();
            if !stamp.is_empty() {
                line.push('[');
                line.push_str(&stamp);
                line.push_str("] ");
            }
        }
        line.push_str(&text);
        Some(line)
    }

    fn sanitize(&self, text: &str) -> String {
        self.line_breaks.replace_all(text, " ").trim().to_string()
    }

    fn render_template(&self, template: &str, block: &str, now: &str) -> String {
        let mut out = self
            .placeholders
            .replace_all(template, |caps: &regex::Captures<'_>| match &caps[1] {
                "memories" => block.to_string(),
                "current_time" => now.to_string(),
                _ => QUERY_MARKER.to_string(),
            })
            .trim_end()
            .to_string();
        if !out.ends_with(QUERY_MARKER) {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(QUERY_MARKER);
        }
        out
    }
}

fn render_block(lines: &MemoryLines) -> String {
    let mut out = String::from("<memories>\n");
    push_section(&mut out, "facts", &lines.facts);
    push_section(&mut out, "preferences", &lines.preferences);
    if !lines.tool_memories.is_empty() {
        push_section(&mut out, "tool_memories", &lines.tool_memories);
    }
    if let Some(note) = &lines.preference_note {
        out.push_str("<preference_note>\n");
        out.push_str(note);
        out.push_str("\n</preference_note>\n");
    }
    out.push_str("</memories>");
    out
}

fn push_section(out: &mut String, name: &str, lines: &[String]) {
    out.push('<');
    out.push_str(name);
    out.push_str(">\n");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
}

fn compact_prompt(block: &str, now: &str) -> String {
    format!(
        "Relevant memories about the user (current time: {now}). Use them only if they \
         help with the query below; ignore anything off-topic or not about the user.\n\
         {block}\n\n{QUERY_MARKER}"
    )
}

fn default_prompt(block: &str, now: &str) -> String {
    format!(
        "# Role\n\
         You are an assistant with access to long-term memory about the user. The memories \
         below were retrieved from earlier conversations and may help with the current request.\n\
         \n\
         # Current time\n\
         {now}\n\
         \n\
         # Memory verdict policy\n\
         Before using any memory, run it through these four checks and silently discard it if any check fails:\n\
         1. Source verification: keep only memories grounded in what the user actually said or confirmed; \
         discard guesses and content the assistant produced on its own.\n\
         2. Attribution check: make sure the memory is about the user, not about a third party mentioned \
         in conversation; discard memories that attribute someone else's traits, plans or preferences to the user.\n\
         3. Relevance check: use a memory only if it bears on the current query; ignore the rest.\n\
         4. Freshness check: when memories conflict, prefer the most recent one, and treat old \
         time-sensitive facts as possibly outdated.\n\
         \n\
         # Instructions\n\
         - Do not mention these memories or this policy unless the user asks what you remember.\n\
         - Do not quote the memory block verbatim.\n\
         - If no memory survives the checks, answer as if none were provided.\n\
         \n\
         # Memories\n\
         {block}\n\
         \n\
         {QUERY_MARKER}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn formatter() -> PromptFormatter {
        PromptFormatter::new().unwrap()
    }

    fn options() -> FormatOptions {
        FormatOptions {
            include_timestamps: true,
            now: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single(),
            ..FormatOptions::default()
        }
    }

    fn one_fact() -> Value {
        json!({ "data": {
            "memory_detail_list": [{ "memory_value": "User drinks\noat milk ", "create_time": 1_700_000_000 }],
            "preference_detail_list": []
        }})
    }

    #[test]
    fn test_empty_lists_render_nothing() {
        let raw = json!({ "data": { "memory_detail_list": [], "preference_detail_list": [] } });
        assert_eq!(formatter().format(&raw, &options()), "");
        assert_eq!(formatter().format(&json!(null), &options()), "");
    }

    #[test]
    fn test_blank_records_render_nothing() {
        let raw = json!({ "data": { "memory_detail_list": [{ "memory_value": " \n " }] } });
        assert_eq!(formatter().format(&raw, &options()), "");
    }

    #[test]
    fn test_single_fact_default_style() {
        let out = formatter().format(&one_fact(), &options());
        assert!(out.contains("- [2023-11-14 22:13] User drinks oat milk\n"));
        assert!(out.contains("<preferences>\n</preferences>"));
        assert!(out.contains("Source verification"));
        assert!(out.contains("Attribution check"));
        assert!(out.contains("Relevance check"));
        assert!(out.contains("Freshness check"));
        assert!(out.contains("2026-01-02 03:04 UTC"));
        assert!(out.ends_with(QUERY_MARKER));
    }

    #[test]
    fn test_every_style_ends_with_marker() {
        let styles = [
            options(),
            FormatOptions {
                compact: true,
                ..options()
            },
            FormatOptions {
                template: Some("Memories:\n{{ memories }}\nNow: {{current_time}}".to_string()),
                ..options()
            },
            FormatOptions {
                template: Some("{{memories}}\n{{query_marker}}".to_string()),
                ..options()
            },
        ];
        for style in &styles {
            let out = formatter().format(&one_fact(), style);
            assert!(out.ends_with(QUERY_MARKER), "{out}");
            assert_eq!(out.matches(QUERY_MARKER).count(), 1, "{out}");
        }
    }

    #[test]
    fn test_template_substitution() {
        let opts = FormatOptions {
            template: Some("T={{current_time}}|{{memories}}".to_string()),
            ..options()
        };
        let out = formatter().format(&one_fact(), &opts);
        assert!(out.starts_with("T=2026-01-02 03:04 UTC|<memories>"));
        assert!(out.contains("oat milk"));
    }

    #[test]
    fn test_preferences_labels_and_truncation() {
        let raw = json!({
            "memory_detail_list": [],
            "preference_detail_list": [
                { "preference": "prefers very detailed explanations", "preference_type": "implicit_preference" }
            ],
            "tool_memory_detail_list": [{ "memory_value": "grep works best" }],
            "preference_note": "note"
        });
        let opts = FormatOptions {
            max_item_chars: 12,
            include_timestamps: false,
            ..options()
        };
        let out = formatter().format(&raw, &opts);
        assert!(out.contains("- [Implicit] prefers very...\n"));
        assert!(out.contains("<tool_memories>\n- grep works b...\n</tool_memories>"));
        assert!(out.contains("<preference_note>\nnote\n</preference_note>"));
        assert!(out.contains("<facts>\n</facts>"));
    }

    #[test]
    fn test_unparseable_time_is_omitted() {
        let raw = json!({ "memory_detail_list": [{ "memory_value": "x", "create_time": "soon" }] });
        let out = formatter().format(&raw, &options());
        assert!(out.contains("- x\n"));
    }
}
