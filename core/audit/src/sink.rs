//! Audit sinks: where emitted events end up.
//!
//! `LogSink` is the default and writes each record to the tracing
//! subscriber. `StoreSink` persists to an `AuditStore`. Swapping one for the
//! other does not change any caller of `AuditService`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::event::AuditEvent;
use crate::store::AuditStore;
use turfguard_common::{Error, Result};

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Get the sink name for diagnostics.
    fn name(&self) -> &str;

    /// Write one record.
    ///
    /// # Errors
    /// - Transient failures (`Io`, `AuditWrite`) are retried by the
    ///   dispatcher for high and critical events
    async fn write(&self, event: &AuditEvent) -> Result<()>;
}

/// Log-only sink: one structured JSON record per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl AuditSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn write(&self, event: &AuditEvent) -> Result<()> {
        let record = serde_json::to_string(event)?;
        info!(target: "turfguard::audit::record", audit_id = %event.id(), record = %record);
        Ok(())
    }
}

/// Durable sink backed by an `AuditStore`.
#[derive(Clone)]
pub struct StoreSink {
    store: Arc<dyn AuditStore>,
}

impl StoreSink {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreSink {
    fn name(&self) -> &str {
        self.store.name()
    }

    async fn write(&self, event: &AuditEvent) -> Result<()> {
        self.store.append(event).await
    }
}

/// Writes every event to each inner sink in order.
///
/// Fails if any inner sink fails; a retry then rewrites to all of them, so
/// consumers see at-least-once delivery.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn write(&self, event: &AuditEvent) -> Result<()> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.write(event).await {
                failures.push(format!("{}: {}", sink.name(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::AuditWrite(failures.join("; ")))
        }
    }
}
