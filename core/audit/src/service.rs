//! Audit service: emission, typed constructors and store-backed analytics.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{AuditDispatcher, DispatchConfig, DispatchStats};
use crate::event::{AuditEvent, AuditEventType, EventContext, NewAuditEvent, Severity};
use crate::report::SecurityReport;
use crate::retry::RetryConfig;
use crate::sink::{AuditSink, FanoutSink, LogSink, StoreSink};
use crate::store::{AuditFilter, AuditStore};
use turfguard_common::Result;

/// Tunables for the audit pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Failed logins within the window above which a user is suspicious.
    pub suspicious_activity_threshold: usize,
    /// Number of IPs listed in a security report.
    pub top_offending_ips: usize,
    /// Retries for high and critical events before dead-lettering.
    pub max_retries: u32,
    /// First retry delay in milliseconds.
    pub retry_initial_delay_ms: u64,
    /// Retry delay cap in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Events the dispatcher queue holds before new ones are refused.
    pub queue_capacity: usize,
    /// Undelivered elevated events kept for redelivery.
    pub dead_letter_capacity: usize,
    /// Seconds between redelivery sweeps of the dead-letter buffer.
    pub dead_letter_requeue_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            suspicious_activity_threshold: 5,
            top_offending_ips: 10,
            max_retries: 5,
            retry_initial_delay_ms: 200,
            retry_max_delay_ms: 30_000,
            queue_capacity: 10_000,
            dead_letter_capacity: 1_000,
            dead_letter_requeue_secs: 60,
        }
    }
}

impl AuditConfig {
    /// Queue and retry settings for the dispatcher.
    pub fn dispatch_config(&self) -> DispatchConfig {
        let retry = RetryConfig::new(self.max_retries).with_delays(
            std::time::Duration::from_millis(self.retry_initial_delay_ms),
            std::time::Duration::from_millis(self.retry_max_delay_ms),
        );
        DispatchConfig::new(retry)
            .with_queue_capacity(self.queue_capacity)
            .with_dead_letter_capacity(self.dead_letter_capacity)
            .with_requeue_interval(std::time::Duration::from_secs(self.dead_letter_requeue_secs))
    }
}

/// Structured, severity-classified audit event emission.
///
/// Share behind an `Arc`; every method takes `&self`.
pub struct AuditService {
    config: AuditConfig,
    dispatcher: AuditDispatcher,
    store: Option<Arc<dyn AuditStore>>,
}

impl AuditService {
    /// Create a service writing to `sink`, with no store for analytics.
    ///
    /// Starts the dispatcher worker, so it must run inside a Tokio runtime.
    pub fn new(config: AuditConfig, sink: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        let (dispatcher, handle) = AuditDispatcher::spawn(sink, config.dispatch_config());
        (
            Self {
                config,
                dispatcher,
                store: None,
            },
            handle,
        )
    }

    /// Log-only service: records go to the tracing subscriber.
    pub fn log_only(config: AuditConfig) -> (Self, JoinHandle<()>) {
        Self::new(config, Arc::new(LogSink))
    }

    /// Service that logs every record and persists it to `store`, which
    /// also backs `detect_suspicious_activity` and `generate_security_report`.
    pub fn with_store(config: AuditConfig, store: Arc<dyn AuditStore>) -> (Self, JoinHandle<()>) {
        let sink = FanoutSink::new(vec![
            Arc::new(LogSink),
            Arc::new(StoreSink::new(store.clone())),
        ]);
        let (mut service, handle) = Self::new(config, Arc::new(sink));
        service.store = Some(store);
        (service, handle)
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Name of the analytics store, if one is attached.
    pub fn store_name(&self) -> Option<&str> {
        self.store.as_deref().map(|s| s.name())
    }

    /// Emit an event.
    ///
    /// Stamps the id and server timestamp, writes the channel log line and
    /// queues the record for the sink. Never waits for the sink.
    pub fn log_event(&self, new: NewAuditEvent) -> AuditEvent {
        let event = AuditEvent::stamp(new);

        if event.severity().is_elevated() {
            warn!(
                target: "turfguard::audit::elevated",
                audit_id = %event.id(),
                event_type = %event.event_type(),
                action = event.action(),
                severity = %event.severity(),
                user_id = event.user_id().unwrap_or("-"),
                ip = event.ip_address().unwrap_or("-"),
                resource = event.resource().unwrap_or("-"),
                "Security audit event"
            );
        } else {
            info!(
                target: "turfguard::audit",
                audit_id = %event.id(),
                event_type = %event.event_type(),
                action = event.action(),
                severity = %event.severity(),
                user_id = event.user_id().unwrap_or("-"),
                ip = event.ip_address().unwrap_or("-"),
                resource = event.resource().unwrap_or("-"),
                "Audit event"
            );
        }

        if let Err(e) = self.dispatcher.dispatch(event.clone()) {
            error!(audit_id = %event.id(), error = %e, "Failed to queue audit event");
        }

        event
    }

    /// Authentication attempt: `low` on success, `medium` on failure.
    pub fn log_auth_event(
        &self,
        action: &str,
        ctx: &EventContext,
        success: bool,
        details: Value,
    ) -> AuditEvent {
        let severity = if success { Severity::Low } else { Severity::Medium };
        self.log_event(
            NewAuditEvent::new(AuditEventType::Auth, action, severity)
                .context(ctx)
                .details(with_flag(details, "success", success)),
        )
    }

    /// Read or write of domain data. Always `low`.
    pub fn log_data_access(
        &self,
        action: &str,
        resource: &str,
        ctx: &EventContext,
        details: Value,
    ) -> AuditEvent {
        self.log_event(
            NewAuditEvent::new(AuditEventType::Data, action, Severity::Low)
                .context(ctx)
                .resource(resource)
                .details(details),
        )
    }

    /// Detected threat: `high` when blocked, `critical` when it got through.
    pub fn log_security_event(
        &self,
        action: &str,
        ctx: &EventContext,
        blocked: bool,
        details: Value,
    ) -> AuditEvent {
        let severity = if blocked { Severity::High } else { Severity::Critical };
        self.log_event(
            NewAuditEvent::new(AuditEventType::Security, action, severity)
                .context(ctx)
                .details(with_flag(details, "blocked", blocked)),
        )
    }

    /// System lifecycle or fault: `high` for errors, `low` otherwise.
    pub fn log_system_event(&self, action: &str, is_error: bool, details: Value) -> AuditEvent {
        let severity = if is_error { Severity::High } else { Severity::Low };
        self.log_event(
            NewAuditEvent::new(AuditEventType::System, action, severity)
                .details(with_flag(details, "success", !is_error)),
        )
    }

    /// Whether `user_id` has more failed logins than the threshold within
    /// the trailing `window_minutes`.
    ///
    /// Returns `false` when no store is attached.
    pub async fn detect_suspicious_activity(&self, user_id: &str, window_minutes: i64) -> Result<bool> {
        let Some(store) = &self.store else {
            debug!(user_id, "No audit store attached; suspicious activity detection skipped");
            return Ok(false);
        };

        let since = Utc::now() - Duration::minutes(window_minutes);
        let filter = AuditFilter::new()
            .event_type(AuditEventType::Auth)
            .user_id(user_id)
            .since(since);
        let failures = store
            .query(&filter)
            .await?
            .iter()
            .filter(|e| e.is_failed_auth())
            .count();

        let suspicious = failures > self.config.suspicious_activity_threshold;
        if suspicious {
            warn!(
                user_id,
                failures,
                window_minutes,
                threshold = self.config.suspicious_activity_threshold,
                "Suspicious authentication activity"
            );
        }
        Ok(suspicious)
    }

    /// Aggregate audit activity between `start` and `end` (inclusive).
    ///
    /// Returns an empty report when no store is attached.
    pub async fn generate_security_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SecurityReport> {
        let Some(store) = &self.store else {
            debug!("No audit store attached; returning empty security report");
            return Ok(SecurityReport::empty(start, end));
        };

        let events = store
            .query(&AuditFilter::new().since(start).until(end))
            .await?;
        Ok(SecurityReport::from_events(
            start,
            end,
            &events,
            self.config.suspicious_activity_threshold,
            self.config.top_offending_ips,
        ))
    }

    /// Wait until every event emitted so far has been handed to the sink.
    pub async fn flush(&self) {
        self.dispatcher.flush().await;
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Whether elevated events are waiting in the dead-letter buffer.
    pub fn is_degraded(&self) -> bool {
        self.dispatcher.is_degraded()
    }

    pub fn dispatcher(&self) -> &AuditDispatcher {
        &self.dispatcher
    }
}

/// Insert an outcome flag into an opaque details payload.
///
/// Objects gain the key; any other value is wrapped as `{"data": value}`.
fn with_flag(details: Value, key: &str, flag: bool) -> Value {
    match details {
        Value::Object(mut map) => {
            map.insert(key.to_string(), Value::Bool(flag));
            Value::Object(map)
        }
        Value::Null => json!({ key: flag }),
        other => json!({ "data": other, key: flag }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service_with_store() -> (AuditService, MemoryStore) {
        let store = MemoryStore::new();
        let config = AuditConfig {
            suspicious_activity_threshold: 2,
            ..AuditConfig::default()
        };
        let (service, _handle) = AuditService::with_store(config, Arc::new(store.clone()));
        (service, store)
    }

    #[test]
    fn test_with_flag() {
        assert_eq!(with_flag(json!({"a": 1}), "success", true), json!({"a": 1, "success": true}));
        assert_eq!(with_flag(Value::Null, "blocked", false), json!({"blocked": false}));
        assert_eq!(with_flag(json!("x"), "success", false), json!({"data": "x", "success": false}));
    }

    #[tokio::test]
    async fn test_log_event_stamps_and_delivers_once() {
        let (service, store) = service_with_store();

        let before = Utc::now();
        let event = service.log_event(NewAuditEvent::new(
            AuditEventType::Data,
            "HORSE_CREATED",
            Severity::Low,
        ));
        service.flush().await;

        assert!(event.timestamp() >= before);
        assert_eq!(store.events(), vec![event]);
    }

    #[tokio::test]
    async fn test_severity_taxonomy() {
        let (service, _store) = service_with_store();
        let ctx = EventContext::new().user_id("u1").ip_address("10.0.0.9");

        assert_eq!(service.log_auth_event("LOGIN", &ctx, true, Value::Null).severity(), Severity::Low);
        assert_eq!(service.log_auth_event("LOGIN", &ctx, false, Value::Null).severity(), Severity::Medium);
        assert_eq!(service.log_security_event("SQLI", &ctx, true, Value::Null).severity(), Severity::High);
        assert_eq!(service.log_security_event("SQLI", &ctx, false, Value::Null).severity(), Severity::Critical);
        assert_eq!(service.log_system_event("CRASH", true, Value::Null).severity(), Severity::High);
        assert_eq!(service.log_system_event("BOOT", false, Value::Null).severity(), Severity::Low);
        assert_eq!(
            service.log_data_access("READ", "/api/horses", &ctx, Value::Null).severity(),
            Severity::Low
        );
    }

    #[tokio::test]
    async fn test_typed_constructors_set_type_and_flags() {
        let (service, _store) = service_with_store();
        let ctx = EventContext::new();

        let auth = service.log_auth_event("LOGIN", &ctx, false, json!({"method": "password"}));
        assert_eq!(auth.event_type(), AuditEventType::Auth);
        assert_eq!(auth.details()["method"], "password");
        assert!(auth.is_failed_auth());

        let sec = service.log_security_event("XSS", &ctx, true, Value::Null);
        assert_eq!(sec.event_type(), AuditEventType::Security);
        assert_eq!(sec.detail_flag("blocked"), Some(true));

        let data = service.log_data_access("UPDATE", "/api/jockeys/3", &ctx, Value::Null);
        assert_eq!(data.resource(), Some("/api/jockeys/3"));
    }

    #[tokio::test]
    async fn test_detect_suspicious_activity_threshold() {
        let (service, _store) = service_with_store();
        let ctx = EventContext::new().user_id("alice");

        for _ in 0..2 {
            service.log_auth_event("LOGIN", &ctx, false, Value::Null);
        }
        service.log_auth_event("LOGIN", &ctx, true, Value::Null);
        service.flush().await;
        assert!(!service.detect_suspicious_activity("alice", 15).await.unwrap());

        service.log_auth_event("LOGIN", &ctx, false, Value::Null);
        service.flush().await;
        assert!(service.detect_suspicious_activity("alice", 15).await.unwrap());
        assert!(!service.detect_suspicious_activity("bob", 15).await.unwrap());
    }

    #[tokio::test]
    async fn test_without_store_analytics_are_inert() {
        let (service, _handle) = AuditService::log_only(AuditConfig::default());
        let ctx = EventContext::new().user_id("alice");
        for _ in 0..10 {
            service.log_auth_event("LOGIN", &ctx, false, Value::Null);
        }
        service.flush().await;

        assert!(!service.detect_suspicious_activity("alice", 60).await.unwrap());
        let now = Utc::now();
        let report = service
            .generate_security_report(now - Duration::hours(1), now)
            .await
            .unwrap();
        assert_eq!(report, SecurityReport::empty(now - Duration::hours(1), now));
        assert_eq!(service.dispatch_stats().delivered, 10);
    }

    #[tokio::test]
    async fn test_generate_security_report() {
        let (service, _store) = service_with_store();
        let start = Utc::now() - Duration::minutes(1);
        let ctx = EventContext::new().user_id("mallory").ip_address("203.0.113.7");

        for _ in 0..3 {
            service.log_auth_event("LOGIN", &ctx, false, Value::Null);
        }
        service.log_security_event("SQL_INJECTION_ATTEMPT", &ctx, false, Value::Null);
        service.log_system_event("HEALTH_CHECK", false, Value::Null);
        service.flush().await;

        let report = service
            .generate_security_report(start, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.total_events, 5);
        assert_eq!(report.critical_events, 1);
        assert_eq!(report.auth_failures, 3);
        assert_eq!(report.suspicious_activities, 1);
        assert_eq!(report.top_offending_ips[0].ip, "203.0.113.7");
        assert_eq!(report.top_offending_ips[0].count, 4);
    }
}
