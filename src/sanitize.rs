//! Reduce noisy model output to a parseable JSON span.
//!
//! Models asked for JSON often wrap it in markdown fences or prose and
//! sometimes leave a trailing comma behind. [`parse_value`] handles those
//! cases in three steps:
//!
//! 1. strip a leading fence marker (with or without a language tag) and a
//!    trailing one, keeping the fenced content;
//! 2. slice from the first `{` or `[` (whichever comes first) to the last
//!    matching closer;
//! 3. parse strictly; on failure run exactly one repair pass that drops
//!    commas directly followed by `}` or `]`, then parse once more.
//!
//! This is not a JSON5 parser. Anything the single repair pass does not
//! fix is a [`SanadError::Parse`] carrying the offending span.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::telemetry;
use crate::{Result, SanadError};

const FENCE: &str = "```";

/// Sanitize and parse model output into a JSON value.
pub fn parse_value(raw: &str) -> Result<Value> {
    let span = extract_span(strip_fences(raw))?;

    match serde_json::from_str(span) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            let repaired = remove_trailing_commas(span);
            match serde_json::from_str(&repaired) {
                Ok(value) => {
                    metrics::counter!(telemetry::PARSE_REPAIRS_TOTAL).increment(1);
                    debug!(error = %strict_err, "model output parsed after trailing-comma repair");
                    Ok(value)
                }
                Err(err) => Err(SanadError::parse(err.to_string(), span)),
            }
        }
    }
}

/// Sanitize, parse, and deserialize model output into `T`.
///
/// A well-formed value that does not fit `T` is also a parse error.
pub fn parse<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value = parse_value(raw)?;
    from_value(value)
}

/// Deserialize an already-sanitized value, mapping mismatches to
/// [`SanadError::Parse`].
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|err| SanadError::parse(format!("unexpected shape: {err}"), value.to_string()))
}

/// Remove a leading fence marker (with its optional language tag) and a
/// trailing fence marker, keeping what they enclose.
///
/// Markers anywhere else are left alone; they may sit inside a JSON string.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(after) = text.strip_prefix(FENCE) {
        let tag_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after.len());
        text = &after[tag_len..];
    }
    if let Some(before) = text.strip_suffix(FENCE) {
        text = before;
    }
    text.trim()
}

/// Slice `text` to the outermost JSON object or array.
pub fn extract_span(text: &str) -> Result<&str> {
    let first_brace = text.find('{');
    let first_bracket = text.find('[');

    let (start, closer) = match (first_brace, first_bracket) {
        (Some(b), Some(k)) if k < b => (k, ']'),
        (Some(b), _) => (b, '}'),
        (None, Some(k)) => (k, ']'),
        (None, None) => {
            return Err(SanadError::parse(
                "no JSON object or array in model output",
                text,
            ));
        }
    };

    match text.rfind(closer) {
        Some(end) if end > start => Ok(&text[start..=end]),
        _ => Err(SanadError::parse(
            format!("unterminated JSON: no closing '{closer}'"),
            &text[start..],
        )),
    }
}

/// One repair pass: drop each comma whose next non-whitespace character is
/// `}` or `]`. Commas inside string literals are left alone.
pub fn remove_trailing_commas(span: &str) -> String {
    let chars: Vec<char> = span.chars().collect();
    let mut out = String::with_capacity(span.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}
