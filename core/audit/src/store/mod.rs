//! Audit store abstraction.
//!
//! A store is append-only: events go in through `append` and come back out
//! through `query`. There is no update or delete.

mod jsonl;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::event::{AuditEvent, AuditEventType, Severity};
use turfguard_common::Result;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// Selection criteria for `AuditStore::query`.
///
/// Every set field must match; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub event_type: Option<AuditEventType>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub action: Option<String>,
    pub min_severity: Option<Severity>,
    /// Inclusive lower bound on the timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the timestamp.
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Check whether an event satisfies this filter.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(t) = self.event_type {
            if event.event_type() != t {
                return false;
            }
        }
        if let Some(user) = &self.user_id {
            if event.user_id() != Some(user.as_str()) {
                return false;
            }
        }
        if let Some(ip) = &self.ip_address {
            if event.ip_address() != Some(ip.as_str()) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if event.action() != action {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if event.severity() < min {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp() < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp() > until {
                return false;
            }
        }
        true
    }
}

/// Durable home for audit events.
///
/// Implementations must tolerate concurrent `append` calls and must never
/// rewrite or drop an appended event.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Get the store name (e.g., "memory", "jsonl").
    fn name(&self) -> &str;

    /// Append one event.
    ///
    /// # Errors
    /// - `AuditWrite` or `Io` if the event could not be persisted
    async fn append(&self, event: &AuditEvent) -> Result<()>;

    /// Return every stored event matching `filter`, oldest first.
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>>;
}
