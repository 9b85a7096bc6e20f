//! JSON Extraction and Repair
//!
//! Generative services asked for JSON still answer with fenced blocks,
//! a sentence of preamble, trailing commas, or a response cut off at the
//! token limit. The repairer recovers the first JSON object from such text.

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{ErrorCategory, LlmError, Result, TransitError};

/// Extract the first JSON object from model output
///
/// Arrays and scalars are rejected: every structured response in this crate
/// is an object.
pub fn extract_json_object(content: &str) -> Result<Value> {
    let (value, repaired) = JsonRepairer::new().parse_or_repair(content)?;
    if repaired {
        debug!("Model output needed JSON repair");
    }
    if !value.is_object() {
        return Err(parse_error("model output must be a JSON object"));
    }
    Ok(value)
}

fn parse_error(message: impl Into<String>) -> TransitError {
    TransitError::Llm(LlmError::new(ErrorCategory::ParseError, message))
}

// =============================================================================
// JsonRepairer
// =============================================================================

/// Ordered repair strategies, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Cut the first balanced `{...}` out of surrounding prose
    SliceObject,
    /// Drop commas directly before `]` or `}`
    TrailingCommas,
    /// Close a truncated string plus any open brackets and braces
    CloseOpen,
}

const STRATEGIES: [Strategy; 3] = [
    Strategy::SliceObject,
    Strategy::TrailingCommas,
    Strategy::CloseOpen,
];

#[derive(Debug, Default)]
pub struct JsonRepairer;

impl JsonRepairer {
    pub fn new() -> Self {
        Self
    }

    /// Parse JSON, applying repair strategies cumulatively until one parses
    ///
    /// Returns (Value, was_repaired)
    pub fn parse_or_repair(&self, raw: &str) -> Result<(Value, bool)> {
        let mut text = strip_wrapping(raw);
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            return Ok((value, false));
        }

        for strategy in STRATEGIES {
            text = match strategy {
                Strategy::SliceObject => slice_first_object(&text).unwrap_or(text),
                Strategy::TrailingCommas => remove_trailing_commas(&text),
                Strategy::CloseOpen => close_open_structures(&text),
            };
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                warn!(?strategy, "Recovered JSON from malformed model output");
                return Ok((value, true));
            }
        }

        Err(parse_error(format!(
            "model output is not valid JSON: {}...",
            raw.chars().take(120).collect::<String>()
        )))
    }
}

/// Trim whitespace, a byte-order mark, and a surrounding markdown fence
fn strip_wrapping(raw: &str) -> String {
    let mut s = raw.trim().trim_start_matches('\u{feff}').trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string (```json) with the rest of the opening line
        s = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    }
    if let Some(body) = s.trim_end().strip_suffix("```") {
        s = body;
    }
    s.trim().to_string()
}

/// Visit every character outside string literals, plus each opening quote
fn for_each_structural(s: &str, mut visit: impl FnMut(usize, char) -> bool) {
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        in_string = ch == '"';
        if !visit(i, ch) {
            return;
        }
    }
}

fn slice_first_object(s: &str) -> Option<String> {
    let start = s.find('{')?;
    let body = &s[start..];
    let mut depth = 0usize;
    let mut end = None;
    for_each_structural(body, |i, ch| {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(i + 1);
                    return false;
                }
            }
            _ => {}
        }
        true
    });
    // An unterminated object is still worth handing to the later strategies
    Some(body[..end.unwrap_or(body.len())].to_string())
}

fn remove_trailing_commas(s: &str) -> String {
    let mut drop = Vec::new();
    let mut pending_comma: Option<usize> = None;
    for_each_structural(s, |i, ch| {
        match ch {
            ',' => pending_comma = Some(i),
            ']' | '}' => {
                if let Some(at) = pending_comma.take() {
                    drop.push(at);
                }
            }
            c if c.is_whitespace() => {}
            _ => pending_comma = None,
        }
        true
    });
    s.char_indices()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, ch)| ch)
        .collect()
}

fn close_open_structures(s: &str) -> String {
    let mut open = Vec::new();
    for_each_structural(s, |_, ch| {
        match ch {
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
        true
    });

    let mut result = s.trim_end().to_string();
    if ends_inside_string(&result) {
        result.push('"');
    }
    while let Some(closer) = open.pop() {
        result.push(closer);
    }
    result
}

fn ends_inside_string(s: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    for ch in s.chars() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ => {}
        }
    }
    in_string
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object_is_not_repaired() {
        let (value, repaired) = JsonRepairer::new()
            .parse_or_repair(r#"{"query_templates": []}"#)
            .unwrap();
        assert!(!repaired);
        assert!(value["query_templates"].is_array());
    }

    #[test]
    fn test_fenced_block() {
        let value = extract_json_object("```json\n{\"key\": \"value\"}\n```").unwrap();
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn test_prose_around_object() {
        let input = "Here is the schema you asked for:\n{\"a\": {\"b\": \"}\"}}\nLet me know!";
        let (value, repaired) = JsonRepairer::new().parse_or_repair(input).unwrap();
        assert!(repaired);
        assert_eq!(value["a"]["b"], "}");
    }

    #[test]
    fn test_trailing_commas() {
        let input = r#"{"columns": [{"name": "stop_id"},], "sql": "a, b",}"#;
        let (value, repaired) = JsonRepairer::new().parse_or_repair(input).unwrap();
        assert!(repaired);
        assert_eq!(value["sql"], "a, b");
        assert_eq!(value["columns"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_output() {
        let input = r#"{"display_templates": [{"key": "routes_table", "title_template": "Rou"#;
        let value = extract_json_object(input).unwrap();
        assert_eq!(value["display_templates"][0]["key"], "routes_table");
    }

    #[test]
    fn test_array_is_rejected() {
        let err = extract_json_object("[1, 2, 3]").unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_garbage_fails() {
        assert!(extract_json_object("no json here at all").is_err());
    }
}
