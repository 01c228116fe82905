//! Signature heuristics for hostile input.
//!
//! These are advisory, defense-in-depth detectors. They produce telemetry
//! and never replace parameterized queries or output encoding: a `false`
//! result says nothing about whether a value is safe to interpolate.

use once_cell::sync::Lazy;
use regex::RegexSet;
use std::fmt;

static SQL_SIGNATURES: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        // Statement shapes
        r"(?i)\bunion\s+(all\s+)?select\b",
        r"(?i)\bselect\s+.+\s+from\b",
        r"(?i)\binsert\s+into\b",
        r"(?i)\bupdate\s+\w+\s+set\b",
        r"(?i)\bdelete\s+from\b",
        r"(?i)\b(drop|alter|truncate)\s+(table|database|schema)\b",
        r"(?i)\bexec(ute)?\s*(\(|\s+(xp_|sp_))",
        // Comment tokens and stacked queries
        r"--",
        r"/\*|\*/",
        r"(?i);\s*(select|insert|update|delete|drop|shutdown)\b",
        // Tautologies
        r#"(?i)\b(or|and)\s+['"]?\w+['"]?\s*=\s*['"]?\w+"#,
        r#"(?i)['"]\s*(or|and)\s+['"]"#,
    ])
    .expect("SQL signatures are valid")
});

static XSS_SIGNATURES: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)<\s*/?\s*(script|iframe|object|embed)\b",
        r"(?i)\b(javascript|vbscript)\s*:",
        // Inline event handlers, only inside a tag
        r"(?i)<[^>]*\bon[a-z]+\s*=",
        r"(?i)<\s*img[^>]+\bsrc\s*=\s*['\x22]?\s*data:text/html",
    ])
    .expect("XSS signatures are valid")
});

/// Category of a detected threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreatKind {
    SqlInjection,
    Xss,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::SqlInjection => "SQL_INJECTION",
            ThreatKind::Xss => "XSS",
        }
    }

    /// Action recorded on the security audit event.
    pub fn audit_action(&self) -> &'static str {
        match self {
            ThreatKind::SqlInjection => "SQL_INJECTION_ATTEMPT",
            ThreatKind::Xss => "XSS_ATTEMPT",
        }
    }

    /// Human-readable threat line for a field.
    pub fn describe(&self, field: &str) -> String {
        match self {
            ThreatKind::SqlInjection => format!("SQL injection attempt in field: {}", field),
            ThreatKind::Xss => format!("XSS attempt in field: {}", field),
        }
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn detect_sql_injection(input: &str) -> bool {
    SQL_SIGNATURES.is_match(input)
}

pub fn detect_xss(input: &str) -> bool {
    XSS_SIGNATURES.is_match(input)
}

/// Every threat category `input` matches, SQL first.
pub fn scan(input: &str) -> Vec<ThreatKind> {
    let mut found = Vec::new();
    if detect_sql_injection(input) {
        found.push(ThreatKind::SqlInjection);
    }
    if detect_xss(input) {
        found.push(ThreatKind::Xss);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_injection_examples() {
        assert!(detect_sql_injection("1 OR 1=1"));
        assert!(detect_sql_injection("admin' --"));
        assert!(detect_sql_injection("x' or 'a'='a"));
        assert!(detect_sql_injection("1; DROP TABLE horses"));
        assert!(detect_sql_injection("0 UNION ALL SELECT password FROM users"));
        assert!(detect_sql_injection("/* comment */ 1"));
    }

    #[test]
    fn test_sql_injection_benign() {
        assert!(!detect_sql_injection("hello world"));
        assert!(!detect_sql_injection("Red Rum"));
        assert!(!detect_sql_injection("Won the Grand National in 1977"));
        assert!(!detect_sql_injection("owner@example.com"));
    }

    #[test]
    fn test_xss_examples() {
        assert!(detect_xss("<script>alert(1)</script>"));
        assert!(detect_xss("<IFRAME src=x>"));
        assert!(detect_xss("javascript:alert(1)"));
        assert!(detect_xss("<img src=x onerror=alert(1)>"));
        assert!(detect_xss("<a href='#' onclick = 'go()'>"));
    }

    #[test]
    fn test_xss_benign() {
        assert!(!detect_xss("plain text"));
        assert!(!detect_xss("Arkle ran on soft ground"));
        assert!(!detect_xss("one=1 online=true"));
        assert!(!detect_xss("<b>bold</b>"));
    }

    #[test]
    fn test_scan_reports_both() {
        assert_eq!(
            scan("<script>1 OR 1=1</script>"),
            vec![ThreatKind::SqlInjection, ThreatKind::Xss]
        );
        assert!(scan("Shergar").is_empty());
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            ThreatKind::Xss.describe("notes"),
            "XSS attempt in field: notes"
        );
        assert_eq!(ThreatKind::SqlInjection.audit_action(), "SQL_INJECTION_ATTEMPT");
    }
}
