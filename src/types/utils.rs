//! Shared utility functions for JSON field extraction.
//!
//! Generated items arrive with loosely named fields (English or Spanish,
//! snake_case or camelCase), so every helper takes a list of accepted keys
//! and returns the first usable match.

use serde_json::Value;

/// Extract the first non-empty string among `keys`.
///
/// Numbers and booleans are rendered as strings; blank strings are ignored.
pub fn json_string_any(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let field = value.get(*key)?;
        let text = match field {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

/// Extract a string array among `keys`.
///
/// Accepts either a JSON array of strings or a single comma-separated string.
pub fn json_string_array_any(value: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        match value.get(*key) {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            Some(Value::String(s)) => {
                return s
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect();
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Extract the first numeric field among `keys` (numeric strings accepted)
pub fn json_f64_any(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Extract the first non-negative integer among `keys` (numeric strings accepted)
pub fn json_u64_any(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_any_prefers_first_usable_key() {
        let v = json!({"question": "  ", "pregunta": "Q"});
        assert_eq!(json_string_any(&v, &["question", "pregunta"]), Some("Q".into()));
        assert_eq!(json_string_any(&v, &["missing"]), None);
    }

    #[test]
    fn test_string_any_renders_scalars() {
        let v = json!({"answer": 42, "flag": true});
        assert_eq!(json_string_any(&v, &["answer"]), Some("42".into()));
        assert_eq!(json_string_any(&v, &["flag"]), Some("true".into()));
    }

    #[test]
    fn test_string_array_any_accepts_csv() {
        let v = json!({"etiquetas": "biology, cells ,"});
        assert_eq!(
            json_string_array_any(&v, &["tags", "etiquetas"]),
            vec!["biology".to_string(), "cells".to_string()]
        );
        let v = json!({"tags": ["a", "", 3]});
        assert_eq!(json_string_array_any(&v, &["tags"]), vec!["a", "3"]);
    }

    #[test]
    fn test_numeric_helpers() {
        let v = json!({"confidence": "0.5", "points": 3, "neg": -1});
        assert_eq!(json_f64_any(&v, &["confidence"]), Some(0.5));
        assert_eq!(json_u64_any(&v, &["points"]), Some(3));
        assert_eq!(json_u64_any(&v, &["neg"]), None);
    }
}
