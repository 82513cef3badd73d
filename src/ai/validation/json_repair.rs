//! JSON Repair Mechanism
//!
//! Extraction and repair for model replies that are supposed to be JSON.
//!
//! Handles the usual failure shapes:
//! - Markdown code fence wrapping (```json ... ```, any tag case, closing fence optional)
//! - JSON embedded in explanatory text
//! - Trailing commas
//! - Raw newlines/tabs inside strings
//! - Truncation by an output-length limit (unterminated string, unclosed brackets)
//!
//! Closing is nesting-aware: appended closers follow the order the structures
//! were opened in, and at most [`MAX_REPAIR_CLOSERS`] characters are appended.

use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::repair::{MAX_REPAIR_CLOSERS, PREVIEW_CHARS};
use crate::types::{ForgeError, Result};

// =============================================================================
// Convenience Functions
// =============================================================================

/// Extract and parse JSON, returning whether repair was needed
pub fn extract_json_with_repair_status(content: &str) -> Result<(Value, bool)> {
    JsonRepairer::new().parse_or_repair(content)
}

/// Close an unterminated string and any unclosed arrays/objects.
///
/// Returns the input unchanged when it is already balanced, and `None` when
/// the closers are mismatched or more than the repair cap would be needed.
pub fn repair_truncation(s: &str) -> Option<String> {
    repair_truncation_capped(s, MAX_REPAIR_CLOSERS)
}

fn repair_truncation_capped(s: &str, cap: usize) -> Option<String> {
    let scan = Scan::run(s)?;
    if scan.stack.is_empty() && !scan.in_string {
        return Some(s.to_string());
    }
    if scan.stack.len() + usize::from(scan.in_string) > cap {
        debug!(
            needed = scan.stack.len(),
            cap, "Truncation repair exceeds closer cap"
        );
        return None;
    }

    let mut out = s.to_string();
    if scan.in_string {
        if scan.escape {
            // A dangling backslash would escape the closing quote
            out.pop();
        }
        out.push('"');
    }
    Some(close_open(out, &scan.stack))
}

/// Drop a partially written trailing element, then close what is still open
fn truncate_to_last_element(s: &str, cap: usize) -> Option<String> {
    let scan = Scan::run(s)?;
    let (cut, stack) = scan.last_comma?;
    if stack.is_empty() || stack.len() > cap {
        return None;
    }
    Some(close_open(s[..cut].to_string(), &stack))
}

fn close_open(mut out: String, stack: &[u8]) -> String {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    }
    for closer in stack.iter().rev() {
        out.push(char::from(*closer));
    }
    out
}

// =============================================================================
// Structural Scan
// =============================================================================

/// String-aware structural state at the end of a scanned prefix
#[derive(Default)]
struct Scan {
    /// Expected closers, innermost last
    stack: Vec<u8>,
    in_string: bool,
    escape: bool,
    /// Byte offset of the last structural comma, with the stack at that point
    last_comma: Option<(usize, Vec<u8>)>,
}

impl Scan {
    /// `None` when a closer does not match the innermost open structure.
    ///
    /// Scans bytes: every structural character is ASCII, and no UTF-8
    /// continuation byte collides with one.
    fn run(s: &str) -> Option<Self> {
        let mut scan = Self::default();
        for (i, b) in s.bytes().enumerate() {
            if scan.in_string {
                if scan.escape {
                    scan.escape = false;
                } else if b == b'\\' {
                    scan.escape = true;
                } else if b == b'"' {
                    scan.in_string = false;
                }
                continue;
            }
            match b {
                b'"' => scan.in_string = true,
                b'{' => scan.stack.push(b'}'),
                b'[' => scan.stack.push(b']'),
                b'}' | b']' => {
                    if scan.stack.pop() != Some(b) {
                        return None;
                    }
                }
                b',' if !scan.stack.is_empty() => {
                    scan.last_comma = Some((i, scan.stack.clone()));
                }
                _ => {}
            }
        }
        Some(scan)
    }
}

// =============================================================================
// JsonRepairer
// =============================================================================

/// JSON repair strategies
pub struct JsonRepairer {
    max_closers: usize,
}

impl Default for JsonRepairer {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRepairer {
    pub fn new() -> Self {
        Self {
            max_closers: MAX_REPAIR_CLOSERS,
        }
    }

    pub fn with_max_closers(mut self, max_closers: usize) -> Self {
        self.max_closers = max_closers;
        self
    }

    /// Parse JSON, attempting repair if initial parse fails
    ///
    /// Returns (Value, was_repaired)
    pub fn parse_or_repair(&self, raw: &str) -> Result<(Value, bool)> {
        let cleaned = self.preprocess(raw);

        if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
            return Ok((value, false));
        }

        debug!("Initial JSON parse failed, attempting repair");

        let Some(start) = cleaned.find(['{', '[']) else {
            return Err(malformed("no JSON object or array found", cleaned));
        };
        let body = fix_trailing_commas(&escape_raw_controls(&cleaned[start..]));

        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            warn!("JSON repaired (prose, trailing commas or raw control characters)");
            return Ok((value, true));
        }

        if let Some(extracted) = extract_balanced(&body)
            && let Ok(value) = serde_json::from_str::<Value>(extracted)
        {
            warn!("JSON extracted from mixed content");
            return Ok((value, true));
        }

        if let Some(closed) = repair_truncation_capped(&body, self.max_closers)
            && let Ok(value) = serde_json::from_str::<Value>(&closed)
        {
            warn!(
                appended = closed.len().saturating_sub(body.len()),
                "Truncated JSON closed"
            );
            return Ok((value, true));
        }

        if let Some(cut) = truncate_to_last_element(&body, self.max_closers)
            && let Ok(value) = serde_json::from_str::<Value>(&cut)
        {
            warn!("Truncated JSON closed after dropping a partial trailing element");
            return Ok((value, true));
        }

        Err(malformed("failed to parse or repair JSON", cleaned))
    }

    /// Trim, drop a BOM and strip code fences
    fn preprocess<'a>(&self, raw: &'a str) -> &'a str {
        let s = raw.trim().trim_start_matches('\u{feff}');
        strip_code_fences(s)
    }
}

fn malformed(reason: &str, content: &str) -> ForgeError {
    ForgeError::MalformedResponse(format!(
        "{}. Content preview: {}...",
        reason,
        content.chars().take(PREVIEW_CHARS).collect::<String>()
    ))
}

/// Strip a leading fence with an optional language tag and an optional trailing fence
fn strip_code_fences(s: &str) -> &str {
    let mut body = s.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        body = rest[tag_len..].trim_start();
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest.trim_end();
    }
    body
}

/// Remove commas directly before `]` or `}` outside strings
fn fix_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            result.push(ch);
            continue;
        }

        match ch {
            '"' => in_string = true,
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some(']') | Some('}')) {
                    continue;
                }
            }
            _ => {}
        }
        result.push(ch);
    }

    result
}

/// Escape raw newlines, carriage returns and tabs that appear inside strings
fn escape_raw_controls(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;

    for ch in s.chars() {
        if in_string {
            if escape {
                escape = false;
            } else {
                match ch {
                    '\\' => escape = true,
                    '"' => in_string = false,
                    '\n' => {
                        result.push_str("\\n");
                        continue;
                    }
                    '\r' => {
                        result.push_str("\\r");
                        continue;
                    }
                    '\t' => {
                        result.push_str("\\t");
                        continue;
                    }
                    _ => {}
                }
            }
        } else if ch == '"' {
            in_string = true;
        }
        result.push(ch);
    }

    result
}

/// First balanced object/array in `s`, ignoring anything after it
fn extract_balanced(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, b) in s[start..].bytes().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid_json() {
        let repairer = JsonRepairer::new();
        let (_, repaired) = repairer.parse_or_repair(r#"{"key": "value"}"#).unwrap();
        assert!(!repaired);
    }

    #[test]
    fn test_strip_code_fences_any_case() {
        let repairer = JsonRepairer::new();
        for input in [
            "```json\n{\"key\": \"value\"}\n```",
            "```JSON\n{\"key\": \"value\"}```",
            "```\n{\"key\": \"value\"}\n```",
            "```json{\"key\": \"value\"}",
        ] {
            let (value, repaired) = repairer.parse_or_repair(input).unwrap();
            assert_eq!(value["key"], "value", "input: {input}");
            assert!(!repaired, "input: {input}");
        }
    }

    #[test]
    fn test_fenced_truncated_flashcards() {
        let input = "```json\n{\"flashcards\": [{\"pregunta\":\"Q\",\"respuesta\":\"A\"}]";
        let (value, repaired) = extract_json_with_repair_status(input).unwrap();
        assert!(repaired);
        assert_eq!(value, json!({"flashcards": [{"pregunta": "Q", "respuesta": "A"}]}));
    }

    #[test]
    fn test_fix_trailing_comma() {
        let repairer = JsonRepairer::new();
        let input = r#"{"cards": [{"q": "a, ]"},]}"#;
        let (value, repaired) = repairer.parse_or_repair(input).unwrap();
        assert!(repaired);
        assert_eq!(value["cards"][0]["q"], "a, ]");
    }

    #[test]
    fn test_closers_follow_nesting_order() {
        let closed = repair_truncation(r#"{"a": [{"b": [1, 2"#).unwrap();
        assert_eq!(closed, r#"{"a": [{"b": [1, 2]}]}"#);
    }

    #[test]
    fn test_truncated_string_closed() {
        let (value, _) = extract_json_with_repair_status(r#"{"questions": [{"text": "What is"#)
            .unwrap();
        assert_eq!(value["questions"][0]["text"], "What is");
    }

    #[test]
    fn test_dangling_escape_dropped() {
        let closed = repair_truncation("[\"abc\\").unwrap();
        assert_eq!(closed, "[\"abc\"]");
    }

    #[test]
    fn test_trailing_comma_and_colon_before_close() {
        assert_eq!(repair_truncation("[1, 2, ").unwrap(), "[1, 2]");
        assert_eq!(repair_truncation(r#"{"a":"#).unwrap(), r#"{"a":null}"#);
    }

    #[test]
    fn test_partial_trailing_element_dropped() {
        let input = r#"{"flashcards": [{"question": "Q1", "answer": "A1"}, {"question": "Q2", "ans"#;
        let (value, repaired) = extract_json_with_repair_status(input).unwrap();
        assert!(repaired);
        assert_eq!(value["flashcards"][0]["answer"], "A1");
        assert_eq!(value["flashcards"][1], json!({"question": "Q2"}));
    }

    #[test]
    fn test_raw_newline_in_string() {
        let input = "{\"answer\": \"line one\nline two\"}";
        let (value, repaired) = extract_json_with_repair_status(input).unwrap();
        assert!(repaired);
        assert_eq!(value["answer"], "line one\nline two");
    }

    #[test]
    fn test_extract_from_mixed() {
        let input = r#"Here are your cards:
{"flashcards": [{"question": "Q", "answer": "A"}]}
Good luck studying!"#;
        let (value, repaired) = extract_json_with_repair_status(input).unwrap();
        assert!(repaired);
        assert!(value["flashcards"].is_array());
    }

    #[test]
    fn test_mismatched_closer_is_not_repaired() {
        assert_eq!(repair_truncation(r#"{"a": [1}"#), None);
    }

    #[test]
    fn test_closer_cap() {
        let deep = "[".repeat(MAX_REPAIR_CLOSERS + 1);
        assert_eq!(repair_truncation(&deep), None);
        let err = JsonRepairer::new().parse_or_repair(&deep).unwrap_err();
        assert!(matches!(err, ForgeError::MalformedResponse(_)));

        let repairer = JsonRepairer::new().with_max_closers(1);
        assert!(repairer.parse_or_repair("[[1").is_err());
        assert!(repairer.parse_or_repair("[1").is_ok());
    }

    #[test]
    fn test_no_json_is_malformed() {
        let err = extract_json_with_repair_status("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, ForgeError::MalformedResponse(ref m) if m.contains("Sorry")));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z \\[\\]{},:\"\\\\]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_repair_is_noop_on_well_formed(value in arb_json()) {
            for text in [value.to_string(), serde_json::to_string_pretty(&value).unwrap()] {
                prop_assert_eq!(repair_truncation(&text), Some(text.clone()));
                let (parsed, repaired) = extract_json_with_repair_status(&text).unwrap();
                prop_assert_eq!(parsed, value.clone());
                prop_assert!(!repaired);
            }
        }
    }
}
