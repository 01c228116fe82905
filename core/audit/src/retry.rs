//! Backoff policy for elevated audit deliveries.
//!
//! Only sink errors that `Error::is_transient` accepts are retried; a
//! serialization failure will not succeed on a second write.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use turfguard_common::{Error, Result};

/// How long and how often to retry a failed sink write.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap for the doubling delay.
    pub max_delay: Duration,
    /// Spread each delay over 75%..125% of its nominal value.
    pub jitter: bool,
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// Set the first delay and the cap.
    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max.max(initial);
        self
    }

    /// Use exact delays.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before retry number `retry` (zero based): `initial * 2^retry`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let nominal = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter {
            nominal.mul_f64(0.75 + rand::random::<f64>() * 0.5)
        } else {
            nominal
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Outcome of a retried write.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    /// Total calls made, including the first.
    pub attempts: u32,
}

/// Runs a write until it succeeds, fails permanently, or the budget runs out.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `write`, retrying transient errors.
    pub async fn run<F, Fut, T>(&self, sink: &str, mut write: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let err = match write().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(sink, attempts, "Audit write recovered");
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(e) => e,
            };

            let retry = attempts - 1;
            if !Error::is_transient(&err) || retry >= self.config.max_retries {
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }

            let delay = self.config.delay_for(retry);
            warn!(
                sink,
                attempts,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Audit write failed, retrying"
            );
            sleep(delay).await;
        }
    }
}
