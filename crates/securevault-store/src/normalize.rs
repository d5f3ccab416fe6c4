//! Wire value normalization.
//!
//! Older rows store document lists as a JSON-encoded string or a bare URL,
//! and numeric columns sometimes arrive as strings. These helpers coerce them
//! into the shapes the typed records expect.

use serde_json::Value;

/// Coerce a document-list value into a list of non-empty strings.
///
/// Accepts an array, a JSON-encoded array string, or a bare string. Anything
/// else (including `null`) yields an empty list.
pub fn normalize_document_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                _ => None,
            })
            .collect(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(parsed @ Value::Array(_)) => normalize_document_list(&parsed),
                _ => vec![s.clone()],
            }
        }
        _ => Vec::new(),
    }
}

/// Coerce a numeric value. Strings are parsed after stripping currency
/// symbols, separators and whitespace; unparseable input becomes `null`.
pub fn normalize_number(value: &Value) -> Value {
    match value {
        Value::Number(_) | Value::Null => value.clone(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
                .collect();
            cleaned
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number)
        }
        _ => Value::Null,
    }
}

/// Ids may be numeric on some backends; records always carry them as text.
pub fn normalize_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
