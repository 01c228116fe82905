//! HTTP security header policy.

use std::collections::BTreeMap;
use turfguard_common::Environment;

pub const STRICT_TRANSPORT_SECURITY: &str = "Strict-Transport-Security";

/// Source whitelist per CSP directive.
const CSP_DIRECTIVES: &[(&str, &[&str])] = &[
    ("default-src", &["'self'"]),
    ("script-src", &["'self'"]),
    ("style-src", &["'self'", "'unsafe-inline'"]),
    ("img-src", &["'self'", "data:", "https:"]),
    ("font-src", &["'self'"]),
    ("connect-src", &["'self'"]),
    ("object-src", &["'none'"]),
    ("frame-ancestors", &["'none'"]),
    ("base-uri", &["'self'"]),
    ("form-action", &["'self'"]),
];

/// Build the `Content-Security-Policy` value from the directive whitelist.
pub fn content_security_policy() -> String {
    CSP_DIRECTIVES
        .iter()
        .map(|(directive, sources)| format!("{} {}", directive, sources.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Header name to value for every response.
///
/// `Strict-Transport-Security` is only sent in production, where the app
/// is served over TLS.
pub fn security_headers(environment: Environment) -> BTreeMap<&'static str, String> {
    let mut headers = BTreeMap::new();
    headers.insert("X-Frame-Options", "DENY".to_string());
    headers.insert("X-Content-Type-Options", "nosniff".to_string());
    headers.insert(
        "Referrer-Policy",
        "strict-origin-when-cross-origin".to_string(),
    );
    headers.insert(
        "Permissions-Policy",
        "camera=(), microphone=(), geolocation=(), payment=()".to_string(),
    );
    headers.insert("Content-Security-Policy", content_security_policy());

    if environment.is_production() {
        headers.insert(
            STRICT_TRANSPORT_SECURITY,
            "max-age=31536000; includeSubDomains; preload".to_string(),
        );
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsts_only_in_production() {
        assert!(security_headers(Environment::Production).contains_key(STRICT_TRANSPORT_SECURITY));
        assert!(!security_headers(Environment::Development).contains_key(STRICT_TRANSPORT_SECURITY));
        assert!(!security_headers(Environment::Test).contains_key(STRICT_TRANSPORT_SECURITY));
    }

    #[test]
    fn test_fixed_headers() {
        let headers = security_headers(Environment::Development);
        assert_eq!(headers["X-Frame-Options"], "DENY");
        assert_eq!(headers["X-Content-Type-Options"], "nosniff");
        assert_eq!(headers.len(), 5);
    }

    #[test]
    fn test_csp_from_whitelist() {
        let csp = content_security_policy();
        assert!(csp.starts_with("default-src 'self'; "));
        assert!(csp.contains("object-src 'none'"));
        assert!(csp.contains("img-src 'self' data: https:"));
        assert!(!csp.ends_with(';'));
    }
}
