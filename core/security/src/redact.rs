//! Redaction of sensitive fields before values reach a log line.

use serde_json::{Map, Value};

/// Replacement for a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Replacement for a subtree below `MAX_LOG_DEPTH`.
pub const TRUNCATED: &str = "[MAX_DEPTH]";

/// Deepest nesting `sanitize_for_log` descends into.
pub const MAX_LOG_DEPTH: usize = 32;

/// Key fragments that mark a field as sensitive, matched case-insensitively
/// against the whole key.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "auth",
    "creditcard",
    "ssn",
    "passport",
    "phonenumber",
];

/// Whether a field name marks its value as sensitive.
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Whether any segment of a dotted field path (`owner.password`,
/// `entries[2].apiKey`) is a sensitive key.
pub fn is_sensitive_path(path: &str) -> bool {
    path.split('.')
        .map(|segment| segment.split('[').next().unwrap_or(segment))
        .any(is_sensitive_key)
}

/// Copy of `value` with every sensitive field replaced by `[REDACTED]`.
///
/// Descends into objects and arrays. Subtrees nested deeper than
/// `MAX_LOG_DEPTH` become `[MAX_DEPTH]`.
pub fn sanitize_for_log(value: &Value) -> Value {
    redact(value, 0)
}

fn redact(value: &Value, depth: usize) -> Value {
    if depth >= MAX_LOG_DEPTH && (value.is_object() || value.is_array()) {
        return Value::String(TRUNCATED.to_string());
    }

    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let redacted = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    redact(inner, depth + 1)
                };
                out.insert(key.clone(), redacted);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| redact(v, depth + 1)).collect()),
        other => other.clone(),
    }
}
