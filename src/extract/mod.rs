//! Forgiving extraction of structured values from generated text.
//!
//! Generated output is often "almost JSON": wrapped in a fenced block,
//! preceded by prose, or followed by commentary. [`extract_json`] recovers
//! the first well-formed value it can find; [`normalize`] turns that value
//! into validated domain entities.

pub mod normalize;

use serde_json::Value;

use crate::errors::ParseError;

/// Extract the first parseable JSON value from `raw`.
///
/// 1. Strip one leading fence (```` ``` ```` or ```` ```json ````) and one trailing fence.
/// 2. Try to parse what is left directly.
/// 3. Otherwise scan every `[` / `{`, walk forward with a bracket stack, and
///    try to parse the substring ending where the stack first empties.
///
/// Brackets inside string literals are not special-cased; a candidate that
/// is cut short by one simply fails to parse and the scan moves on.
pub fn extract_json(raw: &str) -> Result<Value, ParseError> {
    let text = strip_fence(raw);

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    scan_balanced(text).ok_or(ParseError::NoJson)
}

/// Remove a single leading and trailing fenced-block marker, if present.
pub fn strip_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn scan_balanced(text: &str) -> Option<Value> {
    for (start, opener) in text.char_indices() {
        if opener != '[' && opener != '{' {
            continue;
        }

        let mut stack: Vec<char> = Vec::new();
        for (offset, ch) in text[start..].char_indices() {
            match ch {
                '[' | '{' => stack.push(ch),
                ']' | '}' => {
                    let expected = if ch == ']' { '[' } else { '{' };
                    if stack.pop() != Some(expected) {
                        break;
                    }
                    if stack.is_empty() {
                        let end = start + offset + ch.len_utf8();
                        if let Ok(value) = serde_json::from_str::<Value>(&text[start..end]) {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Pull the entity list out of a parsed value: either a bare array or an
/// object carrying the array under `key`.
pub fn entity_list(value: Value, key: &str) -> Result<Vec<Value>, ParseError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(ParseError::UnexpectedShape(format!(
                "'{}' is not an array: {}",
                key, other
            ))),
            None => Err(ParseError::UnexpectedShape(format!(
                "object has no '{}' array",
                key
            ))),
        },
        other => Err(ParseError::UnexpectedShape(format!(
            "expected array or object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_extract_fenced_block() {
        let raw = "```json\n[{\"title\": \"x\"}]\n```";
        assert_eq!(extract_json(raw).unwrap(), json!([{"title": "x"}]));
    }

    #[test]
    fn test_extract_fenced_block_inside_prose() {
        let raw = "Sure, here you go:\n```json\n[1,2,3]\n```\nLet me know if you need more.";
        assert_eq!(extract_json(raw).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_extract_skips_unparseable_candidate() {
        let raw = "notes [see below] then {\"ok\": true}";
        assert_eq!(extract_json(raw).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_extract_nested_object() {
        let raw = "prefix {\"outer\": {\"inner\": [1, {\"deep\": 2}]}} suffix";
        assert_eq!(
            extract_json(raw).unwrap(),
            json!({"outer": {"inner": [1, {"deep": 2}]}})
        );
    }

    #[test]
    fn test_extract_mismatched_brackets_fall_through() {
        let raw = "[ { ] } and then [true]";
        assert_eq!(extract_json(raw).unwrap(), json!([true]));
    }

    #[test]
    fn test_extract_garbage_is_parse_error() {
        assert_eq!(extract_json("no structure here"), Err(ParseError::NoJson));
        assert_eq!(extract_json("{ unclosed"), Err(ParseError::NoJson));
        assert_eq!(extract_json(""), Err(ParseError::NoJson));
    }

    #[test]
    fn test_strip_fence_without_language() {
        assert_eq!(strip_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_fence("  {}  "), "{}");
    }

    #[test]
    fn test_entity_list_shapes() {
        assert_eq!(entity_list(json!([1]), "requirements").unwrap(), vec![json!(1)]);
        assert_eq!(
            entity_list(json!({"requirements": [2]}), "requirements").unwrap(),
            vec![json!(2)]
        );
        assert!(matches!(
            entity_list(json!({"other": []}), "requirements"),
            Err(ParseError::UnexpectedShape(_))
        ));
        assert!(matches!(
            entity_list(json!("text"), "requirements"),
            Err(ParseError::UnexpectedShape(_))
        ));
    }
}
