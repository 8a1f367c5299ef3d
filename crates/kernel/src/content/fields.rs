//! Field resolution with legacy fallbacks.
//!
//! The fallback lists are a compatibility contract with content created
//! under older schemas: order matters and must not be simplified.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

/// Short-summary fields, highest priority first.
pub const SUMMARY_FIELDS: &[&str] = &[
    "field_summary",
    "field_short_summary",
    "field_teaser",
    "field_intro",
];

/// Long-form body fields used when no short summary exists.
pub const BODY_FIELDS: &[&str] = &["field_body", "body"];

/// Fields searched (besides the title) by keyword filters.
pub const SEARCHABLE_FIELDS: &[&str] = &["field_body", "body", "field_description"];

/// Taxonomy reference fields.
pub const THEME_FIELDS: &[&str] = &[
    "field_theme",
    "field_insight_theme",
    "field_topic",
    "field_category",
];

/// Read-time fields.
pub const READ_TIME_FIELDS: &[&str] = &[
    "field_read_time",
    "field_reading_time",
    "field_time_to_read",
];

/// Characters of body text kept when deriving a summary.
pub const SUMMARY_BODY_CHARS: usize = 240;

#[allow(clippy::expect_used)]
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex literal"));

/// Read a text field that may be stored as a string, as `{"value": ...}`,
/// or as a list of either (first element wins).
///
/// Returns `None` for missing, non-text, or blank values.
pub fn text_value(fields: &Value, name: &str) -> Option<String> {
    text_of(fields.get(name)?)
}

fn text_of(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("value")?.as_str()?,
        Value::Array(list) => return list.first().and_then(text_of),
        _ => return None,
    };
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Resolve an item summary.
///
/// Explicit summary fields win; otherwise the body is stripped of markup
/// and cut to [`SUMMARY_BODY_CHARS`] characters. Empty when neither exists.
pub fn resolve_summary(fields: &Value) -> String {
    if let Some(summary) = SUMMARY_FIELDS
        .iter()
        .filter_map(|name| text_value(fields, name))
        .map(|text| strip_markup(&text))
        .find(|text| !text.is_empty())
    {
        return summary;
    }

    BODY_FIELDS
        .iter()
        .filter_map(|name| text_value(fields, name))
        .map(|text| truncate_chars(&strip_markup(&text), SUMMARY_BODY_CHARS))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// First taxonomy term referenced by the item, if any.
///
/// Accepts a UUID string, a `{"target_id": ...}` object, or a list whose
/// first element is either of those.
pub fn theme_reference(fields: &Value) -> Option<Uuid> {
    THEME_FIELDS
        .iter()
        .filter_map(|name| fields.get(*name))
        .find_map(term_id)
}

fn term_id(value: &Value) -> Option<Uuid> {
    match value {
        Value::String(s) => Uuid::parse_str(s.trim()).ok(),
        Value::Object(map) => map.get("target_id").and_then(term_id),
        Value::Array(list) => list.first().and_then(term_id),
        _ => None,
    }
}

/// Resolve the read-time string; numbers are rendered as decimal text.
pub fn resolve_read_time(fields: &Value) -> String {
    READ_TIME_FIELDS
        .iter()
        .find_map(|name| match fields.get(*name)? {
            Value::Number(n) => Some(n.to_string()),
            _ => text_value(fields, name),
        })
        .unwrap_or_default()
}

/// Remove all markup, decode basic entities, and collapse whitespace.
pub fn strip_markup(html: &str) -> String {
    let mut builder = ammonia::Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    let cleaned = builder.clean(html).to_string();
    let decoded = cleaned
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Keep at most `max` characters, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
