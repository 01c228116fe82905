//! Security report aggregation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::event::{AuditEvent, AuditEventType, Severity};

/// Event count for one source IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpCount {
    pub ip: String,
    pub count: usize,
}

/// Aggregate view of audit activity over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_events: usize,
    pub critical_events: usize,
    pub auth_failures: usize,
    /// Users whose failed logins in the range exceed the threshold.
    pub suspicious_activities: usize,
    pub top_offending_ips: Vec<IpCount>,
}

impl SecurityReport {
    /// A report with every count at zero.
    pub fn empty(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            total_events: 0,
            critical_events: 0,
            auth_failures: 0,
            suspicious_activities: 0,
            top_offending_ips: Vec::new(),
        }
    }

    /// Aggregate `events`, which must already be restricted to the range.
    pub fn from_events(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        events: &[AuditEvent],
        suspicious_threshold: usize,
        top_ips: usize,
    ) -> Self {
        let mut failures_per_user: HashMap<&str, usize> = HashMap::new();
        let mut offences_per_ip: HashMap<&str, usize> = HashMap::new();
        let mut auth_failures = 0;

        for event in events {
            let failed_auth = event.is_failed_auth();
            if failed_auth {
                auth_failures += 1;
                if let Some(user) = event.user_id() {
                    *failures_per_user.entry(user).or_default() += 1;
                }
            }
            if failed_auth || event.event_type() == AuditEventType::Security {
                if let Some(ip) = event.ip_address() {
                    *offences_per_ip.entry(ip).or_default() += 1;
                }
            }
        }

        let mut top_offending_ips: Vec<IpCount> = offences_per_ip
            .into_iter()
            .map(|(ip, count)| IpCount {
                ip: ip.to_string(),
                count,
            })
            .collect();
        top_offending_ips.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
        top_offending_ips.truncate(top_ips);

        Self {
            start,
            end,
            total_events: events.len(),
            critical_events: events
                .iter()
                .filter(|e| e.severity() == Severity::Critical)
                .count(),
            auth_failures,
            suspicious_activities: failures_per_user
                .values()
                .filter(|&&count| count > suspicious_threshold)
                .count(),
            top_offending_ips,
        }
    }
}
