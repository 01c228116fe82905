//! Input validation and security policy for TurfGuard.
//!
//! This module provides:
//! - Sanitization and email checks
//! - A password strength policy that reports every failed rule
//! - Advisory SQL injection and XSS heuristics
//! - CSRF token comparison, security headers and log redaction
//! - `SecurityService`, which ties these to encryption and audit
//!
//! The threat heuristics are defense-in-depth only. Queries must still be
//! parameterized and output must still be encoded.

pub mod csrf;
pub mod headers;
pub mod password_policy;
pub mod redact;
pub mod sanitize;
pub mod service;
pub mod threats;

pub use csrf::{validate_csrf_token, MIN_CSRF_TOKEN_LENGTH};
pub use headers::{content_security_policy, security_headers, STRICT_TRANSPORT_SECURITY};
pub use password_policy::{validate_strong_password, PasswordValidation, SPECIAL_CHARACTERS};
pub use redact::{is_sensitive_key, is_sensitive_path, sanitize_for_log, REDACTED};
pub use sanitize::{sanitize_input, sanitize_value, validate_email};
pub use service::{SecurityPolicy, SecurityService, SecurityValidationResult, TokenPurpose};
pub use threats::{detect_sql_injection, detect_xss, ThreatKind};
