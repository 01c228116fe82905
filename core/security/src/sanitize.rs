//! Input sanitization and format checks.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Longest address accepted by `validate_email` (RFC 5321 path limit).
pub const MAX_EMAIL_LENGTH: usize = 254;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// Trim and HTML-escape `& < > " '`.
///
/// Inputs without any of those characters come back trimmed and otherwise
/// unchanged.
pub fn sanitize_input(input: &str) -> String {
    let trimmed = input.trim();
    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// `sanitize_input` for untyped request values. Anything but a string is `""`.
pub fn sanitize_value(value: &Value) -> String {
    match value {
        Value::String(s) => sanitize_input(s),
        _ => String::new(),
    }
}

/// Basic shape check for an email address, after sanitization.
pub fn validate_email(email: &str) -> bool {
    let sanitized = sanitize_input(email);
    sanitized.len() <= MAX_EMAIL_LENGTH && EMAIL.is_match(&sanitized)
}
