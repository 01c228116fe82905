//! Audit event pipeline for TurfGuard.
//!
//! This module provides:
//! - The immutable `AuditEvent` record and its severity taxonomy
//! - `AuditSink` (where records go) with a log-only default and a durable
//!   store-backed implementation
//! - `AuditStore` (append/query) with in-memory and JSON-lines backends
//! - A background dispatcher that keeps audit writes off the request path
//!   and retries high and critical events until delivered or dead-lettered
//! - `AuditService` with typed constructors and store-backed analytics
//!
//! # Data Flow
//! ```text
//! AuditService::log_event
//!     → stamp id + timestamp
//!     → channel log line (standard or elevated)
//!     → AuditDispatcher (mpsc, non-blocking)
//!         → AuditSink::write (retry for high/critical)
//!         → dead letters on exhaustion
//! ```

pub mod dispatcher;
pub mod event;
pub mod report;
pub mod retry;
pub mod service;
pub mod sink;
pub mod store;

pub use dispatcher::{AuditDispatcher, DispatchConfig, DispatchStats};
pub use event::{AuditEvent, AuditEventType, EventContext, NewAuditEvent, Severity};
pub use report::{IpCount, SecurityReport};
pub use retry::{Attempted, RetryConfig, RetryExecutor};
pub use service::{AuditConfig, AuditService};
pub use sink::{AuditSink, FanoutSink, LogSink, StoreSink};
pub use store::{AuditFilter, AuditStore, JsonlStore, MemoryStore};
