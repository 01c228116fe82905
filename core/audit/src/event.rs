//! Audit event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Category of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEventType {
    Auth,
    Data,
    System,
    Security,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Auth => "auth",
            AuditEventType::Data => "data",
            AuditEventType::System => "system",
            AuditEventType::Security => "security",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal severity. Governs the logging channel and delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical events go to the elevated channel and are
    /// delivered at least once.
    pub fn is_elevated(&self) -> bool {
        *self >= Severity::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who and where an action came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// An audit event before emission.
///
/// Has no id or timestamp: both are assigned by `AuditService::log_event`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    pub action: String,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub resource: Option<String>,
    pub details: serde_json::Value,
}

impl NewAuditEvent {
    pub fn new(event_type: AuditEventType, action: impl Into<String>, severity: Severity) -> Self {
        Self {
            event_type,
            action: action.into(),
            severity,
            user_id: None,
            ip_address: None,
            user_agent: None,
            resource: None,
            details: serde_json::Value::Null,
        }
    }

    /// Copy user, IP and user agent from a context.
    pub fn context(mut self, ctx: &EventContext) -> Self {
        self.user_id = ctx.user_id.clone();
        self.ip_address = ctx.ip_address.clone();
        self.user_agent = ctx.user_agent.clone();
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Immutable record of a security- or compliance-relevant action.
///
/// `details` is an opaque JSON value: callers attach whatever the action
/// needs, and consumers must not assume a schema beyond the `success` and
/// `blocked` flags the typed constructors add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    id: Uuid,
    #[serde(rename = "type")]
    event_type: AuditEventType,
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource: Option<String>,
    #[serde(default)]
    details: serde_json::Value,
    timestamp: DateTime<Utc>,
    severity: Severity,
}

impl AuditEvent {
    /// Stamp a new event with an id and the current server time.
    pub(crate) fn stamp(new: NewAuditEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: new.event_type,
            action: new.action,
            user_id: new.user_id,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            resource: new.resource,
            details: new.details,
            timestamp: Utc::now(),
            severity: new.severity,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> AuditEventType {
        self.event_type
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn details(&self) -> &serde_json::Value {
        &self.details
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Read a boolean flag from the details object.
    pub fn detail_flag(&self, key: &str) -> Option<bool> {
        self.details.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Whether this records a failed authentication attempt.
    pub fn is_failed_auth(&self) -> bool {
        self.event_type == AuditEventType::Auth && self.detail_flag("success") == Some(false)
    }
}
