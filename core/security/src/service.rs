//! Security service: request validation, tokens and policy lookups.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::headers::security_headers;
use crate::password_policy::{validate_strong_password, PasswordValidation};
use crate::redact::{is_sensitive_path, sanitize_for_log, REDACTED};
use crate::threats::{self, ThreatKind};
use crate::{csrf, sanitize};
use turfguard_audit::{AuditService, EventContext};
use turfguard_common::{Environment, Error, Result};
use turfguard_crypto::EncryptionService;

/// Characters of an offending value kept on the audit record.
const THREAT_SAMPLE_CHARS: usize = 64;

/// Enforcement settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Reject requests that match a threat heuristic instead of only
    /// recording them. Threat events are then logged as blocked (`high`)
    /// rather than `critical`.
    pub block_on_threat: bool,
}

/// What a generated token is for. Each purpose has a fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Session,
    Csrf,
    Api,
    PasswordReset,
}

impl TokenPurpose {
    /// Random bytes drawn for this purpose; the hex token is twice as long.
    pub fn byte_length(&self) -> usize {
        match self {
            TokenPurpose::Session => 64,
            TokenPurpose::Csrf => 32,
            TokenPurpose::Api => 48,
            TokenPurpose::PasswordReset => 32,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Session => "session",
            TokenPurpose::Csrf => "csrf",
            TokenPurpose::Api => "api",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }
}

impl FromStr for TokenPurpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "session" => Ok(TokenPurpose::Session),
            "csrf" => Ok(TokenPurpose::Csrf),
            "api" => Ok(TokenPurpose::Api),
            "password_reset" => Ok(TokenPurpose::PasswordReset),
            other => Err(Error::InvalidInput(format!("Unknown token purpose: {}", other))),
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scanning a request payload. Produced even when nothing is found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityValidationResult {
    pub is_valid: bool,
    pub threats: Vec<String>,
    /// Threat kind and field path behind each entry of `threats`.
    #[serde(skip)]
    pub detected: Vec<(ThreatKind, String)>,
}

impl SecurityValidationResult {
    /// `ThreatDetected` for the first finding, if any.
    pub fn to_error(&self) -> Option<Error> {
        self.detected.first().map(|(kind, field)| Error::ThreatDetected {
            kind: kind.as_str().to_string(),
            field: field.clone(),
        })
    }
}

/// Input validation, threat heuristics and security policy.
pub struct SecurityService {
    environment: Environment,
    policy: SecurityPolicy,
    encryption: Arc<EncryptionService>,
    audit: Arc<AuditService>,
}

impl SecurityService {
    pub fn new(
        environment: Environment,
        policy: SecurityPolicy,
        encryption: Arc<EncryptionService>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            environment,
            policy,
            encryption,
            audit,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    pub fn encryption(&self) -> &EncryptionService {
        &self.encryption
    }

    pub fn audit(&self) -> &AuditService {
        &self.audit
    }

    pub fn sanitize_input(&self, input: &str) -> String {
        sanitize::sanitize_input(input)
    }

    pub fn validate_email(&self, email: &str) -> bool {
        sanitize::validate_email(email)
    }

    pub fn validate_strong_password(&self, password: &str) -> PasswordValidation {
        validate_strong_password(password)
    }

    /// Advisory SQL injection heuristic. See [`threats`].
    pub fn detect_sql_injection(&self, input: &str) -> bool {
        threats::detect_sql_injection(input)
    }

    /// Advisory XSS heuristic. See [`threats`].
    pub fn detect_xss(&self, input: &str) -> bool {
        threats::detect_xss(input)
    }

    /// Scan every string in `data` and record a security event per threat.
    pub fn validate_request(
        &self,
        data: &Value,
        ip_address: &str,
        user_agent: &str,
    ) -> SecurityValidationResult {
        let ctx = EventContext::new()
            .ip_address(ip_address)
            .user_agent(user_agent);
        self.validate_request_with_context(data, &ctx)
    }

    /// `validate_request` with a full event context, including the user.
    ///
    /// Nested objects and arrays are walked to any depth; fields are named
    /// by dotted path with bracketed array indices (`entries[2].name`).
    /// Values of sensitive fields never reach the audit record.
    pub fn validate_request_with_context(
        &self,
        data: &Value,
        ctx: &EventContext,
    ) -> SecurityValidationResult {
        let fields = collect_strings(data);

        let blocked = self.policy.block_on_threat;
        let mut found = Vec::new();
        let mut detected = Vec::new();
        for (field, value) in fields {
            for kind in threats::scan(value) {
                warn!(
                    threat = %kind,
                    field = %field,
                    ip = ctx.ip_address.as_deref().unwrap_or("unknown"),
                    blocked,
                    "Potential attack pattern in request field"
                );
                self.audit.log_security_event(
                    kind.audit_action(),
                    ctx,
                    blocked,
                    json!({
                        "field": field,
                        "threatType": kind.as_str(),
                        "sample": sample(&field, value),
                    }),
                );
                found.push(kind.describe(&field));
                detected.push((kind, field.clone()));
            }
        }

        SecurityValidationResult {
            is_valid: found.is_empty(),
            threats: found,
            detected,
        }
    }

    /// Hex token sized for `purpose`.
    pub fn generate_secure_token(&self, purpose: TokenPurpose) -> String {
        self.encryption.generate_secure_token(purpose.byte_length())
    }

    pub fn validate_csrf_token(&self, token: &str, session_token: &str) -> bool {
        csrf::validate_csrf_token(token, session_token)
    }

    /// Encrypt with the process-wide key.
    pub fn encrypt_sensitive_data(&self, data: &str) -> Result<String> {
        self.encryption.encrypt_str(data, None)
    }

    /// Decrypt a payload from `encrypt_sensitive_data`.
    pub fn decrypt_sensitive_data(&self, payload: &str) -> Result<String> {
        self.encryption.decrypt_to_string(payload, None)
    }

    pub fn sanitize_for_log(&self, value: &Value) -> Value {
        sanitize_for_log(value)
    }

    /// Response headers for the configured environment.
    pub fn get_security_headers(&self) -> BTreeMap<&'static str, String> {
        security_headers(self.environment)
    }
}

/// Every string in `root` with its field path, in document order.
///
/// Iterative, so nesting depth is bounded by memory rather than the stack.
fn collect_strings(root: &Value) -> Vec<(String, &str)> {
    let mut out = Vec::new();
    let mut pending = vec![(String::new(), root)];

    while let Some((path, value)) = pending.pop() {
        match value {
            Value::String(s) => {
                let field = if path.is_empty() { "value".to_string() } else { path };
                out.push((field, s.as_str()));
            }
            Value::Object(map) => {
                for (key, inner) in map.iter().rev() {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    pending.push((child, inner));
                }
            }
            Value::Array(items) => {
                for (i, inner) in items.iter().enumerate().rev() {
                    pending.push((format!("{}[{}]", path, i), inner));
                }
            }
            _ => {}
        }
    }
    out
}

fn sample(field: &str, value: &str) -> String {
    if is_sensitive_path(field) {
        return REDACTED.to_string();
    }
    value.chars().take(THREAT_SAMPLE_CHARS).collect()
}
