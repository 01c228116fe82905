//! Background delivery of audit events.
//!
//! `dispatch` is a non-blocking send onto a bounded queue, so emitting an
//! audit event never waits on the sink. A single worker task drains the
//! queue in order.
//!
//! Delivery guarantees:
//! - high / critical: retried with backoff; after the retry budget the event
//!   is moved to the dead-letter buffer and logged at `error`. The worker
//!   redelivers dead letters every `requeue_interval`
//! - low / medium: one attempt, `warn` on failure
//!
//! Both the queue and the dead-letter buffer are bounded. An elevated event
//! refused by a full queue, or evicted from a full dead-letter buffer, is
//! written in full to the `error` log.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::event::AuditEvent;
use crate::retry::{RetryConfig, RetryExecutor};
use crate::sink::AuditSink;
use turfguard_common::{Error, Result};

/// Queue, dead-letter and retry settings for the worker.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub retry: RetryConfig,
    /// Events waiting for the worker before `dispatch` refuses more.
    pub queue_capacity: usize,
    /// Elevated events kept for redelivery; the oldest is evicted past this.
    pub dead_letter_capacity: usize,
    /// How often the worker retries the dead-letter buffer.
    pub requeue_interval: Duration,
}

impl DispatchConfig {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            retry,
            queue_capacity: 10_000,
            dead_letter_capacity: 1_000,
            requeue_interval: Duration::from_secs(60),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity.max(1);
        self
    }

    pub fn with_requeue_interval(mut self, interval: Duration) -> Self {
        self.requeue_interval = interval.max(Duration::from_millis(1));
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

enum Command {
    Deliver(AuditEvent),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
}

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    /// Events written to the sink.
    pub delivered: u64,
    /// Elevated deliveries that needed more than one attempt.
    pub retried: u64,
    /// Elevated deliveries that exhausted their retries.
    pub dead_lettered: u64,
    /// Low / medium events whose single attempt failed.
    pub dropped: u64,
    /// Events refused because the queue was full.
    pub rejected: u64,
    /// Dead letters evicted from a full buffer.
    pub evicted: u64,
}

type DeadLetters = Arc<Mutex<VecDeque<AuditEvent>>>;

/// Handle to the background audit worker.
///
/// Cheap to clone; the worker stops once every handle is dropped and the
/// queue is drained.
#[derive(Clone)]
pub struct AuditDispatcher {
    tx: mpsc::Sender<Command>,
    counters: Arc<Counters>,
    dead_letters: DeadLetters,
}

impl AuditDispatcher {
    /// Start the worker on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, config: DispatchConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let dead_letters: DeadLetters = Arc::new(Mutex::new(VecDeque::new()));

        let worker = Worker {
            sink,
            executor: RetryExecutor::new(config.retry),
            counters: counters.clone(),
            dead_letters: dead_letters.clone(),
            dead_letter_capacity: config.dead_letter_capacity.max(1),
        };
        let handle = tokio::spawn(worker.run(rx, config.requeue_interval));

        (
            Self {
                tx,
                counters,
                dead_letters,
            },
            handle,
        )
    }

    /// Queue an event for delivery without waiting.
    ///
    /// # Errors
    /// - `AuditWrite` if the queue is full or the worker is no longer
    ///   running. For elevated events the full record is logged at `error`
    ///   so it is not lost.
    pub fn dispatch(&self, event: AuditEvent) -> Result<()> {
        let (event, reason) = match self.tx.try_send(Command::Deliver(event)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(Command::Deliver(event))) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                (event, "Audit queue is full")
            }
            Err(TrySendError::Closed(Command::Deliver(event))) => {
                (event, "Audit dispatcher is not running")
            }
            Err(_) => return Err(Error::AuditWrite("Audit queue rejected a command".to_string())),
        };

        if event.severity().is_elevated() {
            error!(
                target: "turfguard::audit::elevated",
                audit_id = %event.id(),
                record = %serde_json::to_string(&event).unwrap_or_default(),
                reason,
                "Elevated event could not be queued"
            );
        }
        Err(Error::AuditWrite(reason.to_string()))
    }

    /// Wait until every event queued before this call has been processed.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Current counters.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }

    /// Elevated events waiting for redelivery, oldest first.
    pub fn dead_letters(&self) -> Vec<AuditEvent> {
        self.dead_letters
            .lock()
            .map(|letters| letters.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any elevated event is sitting in the dead-letter buffer.
    pub fn is_degraded(&self) -> bool {
        self.dead_letters
            .lock()
            .map(|letters| !letters.is_empty())
            .unwrap_or(true)
    }
}

struct Worker {
    sink: Arc<dyn AuditSink>,
    executor: RetryExecutor,
    counters: Arc<Counters>,
    dead_letters: DeadLetters,
    dead_letter_capacity: usize,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Command>, requeue_interval: Duration) {
        let mut requeue = tokio::time::interval(requeue_interval);
        requeue.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Deliver(event)) => self.deliver(event).await,
                    Some(Command::Flush(done)) => {
                        let _ = done.send(());
                    }
                    None => break,
                },
                _ = requeue.tick() => self.redeliver_dead_letters().await,
            }
        }
        debug!(sink = self.sink.name(), "Audit worker stopped");
    }

    async fn redeliver_dead_letters(&self) {
        let letters: Vec<AuditEvent> = match self.dead_letters.lock() {
            Ok(mut letters) => letters.drain(..).collect(),
            Err(_) => return,
        };
        if letters.is_empty() {
            return;
        }

        info!(
            sink = self.sink.name(),
            count = letters.len(),
            "Redelivering dead-lettered audit events"
        );
        for event in letters {
            self.deliver(event).await;
        }
    }

    async fn deliver(&self, event: AuditEvent) {
        if !event.severity().is_elevated() {
            match self.sink.write(&event).await {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        sink = self.sink.name(),
                        audit_id = %event.id(),
                        severity = %event.severity(),
                        error = %e,
                        "Best-effort audit write failed"
                    );
                }
            }
            return;
        }

        let outcome = self
            .executor
            .run(self.sink.name(), || self.sink.write(&event))
            .await;

        if outcome.attempts > 1 {
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
        }

        match outcome.result {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "turfguard::audit::elevated",
                    sink = self.sink.name(),
                    audit_id = %event.id(),
                    severity = %event.severity(),
                    error = %e,
                    record = %serde_json::to_string(&event).unwrap_or_default(),
                    "Elevated audit event could not be delivered; kept in dead-letter buffer"
                );
                self.park(event);
            }
        }
    }

    fn park(&self, event: AuditEvent) {
        let evicted = match self.dead_letters.lock() {
            Ok(mut letters) => {
                letters.push_back(event);
                if letters.len() > self.dead_letter_capacity {
                    letters.pop_front()
                } else {
                    None
                }
            }
            Err(_) => Some(event),
        };

        if let Some(lost) = evicted {
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            error!(
                target: "turfguard::audit::elevated",
                audit_id = %lost.id(),
                record = %serde_json::to_string(&lost).unwrap_or_default(),
                capacity = self.dead_letter_capacity,
                "Dead-letter buffer full; evicted audit event"
            );
        }
    }
}
