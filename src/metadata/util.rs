//! Small helpers for pulling typed values out of provider JSON.

use serde_json::Value;

/// String at `key`, if present and a string.
pub fn str_of(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// String at a nested `outer.inner` path.
pub fn nested_str(value: &Value, outer: &str, inner: &str) -> Option<String> {
    value
        .get(outer)
        .and_then(|v| v.get(inner))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Integer at `key`, if present and numeric.
pub fn u64_of(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

/// Boolean at `key`, defaulting when absent.
pub fn bool_of(value: &Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// An id field rendered as a string, whether the provider sent a number
/// or a string.
pub fn id_of(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// First four characters of a date string, the release year.
pub fn year_of(date: Option<&str>) -> String {
    date.filter(|d| d.len() >= 4)
        .map_or_else(|| "Unknown".to_string(), |d| d[..4].to_string())
}
