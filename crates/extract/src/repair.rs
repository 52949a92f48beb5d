//! Best-effort recovery of JSON from free-form model output.
//!
//! Models wrap answers in prose or code fences and occasionally emit trailing commas or
//! single-quoted strings. [`parse_json_safely`] tries progressively more invasive fixes
//! and gives up with diagnostics rather than guessing. This is not a JSON grammar: a `}`
//! inside a string after the real object will still defeat the span heuristic.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PipelineError;

/// How much of the original/cleaned text is kept in a parse error.
pub const EXCERPT_CHARS: usize = 500;

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid fence regex"));
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```\s*$").expect("valid fence regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid comma regex"));
static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*?)'").expect("valid quote regex"));
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1F\x7F-\x9F]").expect("valid control regex"));

/// Parse model output into a JSON value, escalating through three attempts:
/// strict parse, fence-stripped `{...}` span, then textual repairs on that span.
pub fn parse_json_safely(text: &str) -> Result<Value, PipelineError> {
    let first_error = match serde_json::from_str(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let cleaned = extract_json_span(text);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        debug!("Recovered JSON after stripping surrounding text");
        return Ok(value);
    }

    let repaired = repair_json(&cleaned);
    match serde_json::from_str(&repaired) {
        Ok(value) => {
            debug!("Recovered JSON after textual repairs");
            Ok(value)
        }
        Err(final_error) => {
            warn!(
                original_len = text.len(),
                cleaned_len = cleaned.len(),
                error = %final_error,
                "JSON parsing failed after all attempts"
            );
            Err(PipelineError::UpstreamParse {
                message: final_error.to_string(),
                original_error: first_error.to_string(),
                original_excerpt: excerpt(text),
                cleaned_excerpt: excerpt(&cleaned),
            })
        }
    }
}

/// Strip code fences and cut the text down to the first `{` .. last `}` span.
/// Text without such a span is returned trimmed.
pub fn extract_json_span(text: &str) -> String {
    let mut cleaned = text.trim().to_string();

    if cleaned.contains("```") {
        cleaned = OPENING_FENCE.replace(&cleaned, "").into_owned();
        cleaned = CLOSING_FENCE.replace(&cleaned, "").trim().to_string();
    }

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => cleaned[start..=end].to_string(),
        _ => cleaned,
    }
}

/// Apply the conservative textual fixes: drop trailing commas before `}`/`]`, turn
/// single-quoted strings into double-quoted ones, remove control characters.
pub fn repair_json(broken: &str) -> String {
    let fixed = TRAILING_COMMA.replace_all(broken, "$1");
    let fixed = SINGLE_QUOTED.replace_all(&fixed, "\"$1\"");
    CONTROL_CHARS.replace_all(&fixed, "").into_owned()
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}
