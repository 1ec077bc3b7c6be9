// src/ingest/retry.rs
//! Bounded retries with exponential backoff around a single adapter call.

use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use metrics::counter;
use serde::Deserialize;
use tracing::warn;

use crate::error::{AdapterError, FinalError};

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        let initial_delay_ms = initial_delay.as_millis() as u64;
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms: initial_delay_ms.saturating_mul(10),
        }
    }

    fn initial_delay(&self) -> Duration {
        // Never spin: at least 1ms between attempts.
        Duration::from_millis(self.initial_delay_ms.max(1))
    }

    fn backoff(&self) -> ExponentialBackoff {
        let initial = self.initial_delay();
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: Duration::from_millis(self.max_delay_ms).max(initial),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// One failed attempt, as reported to a [`RetryObserver`].
#[derive(Debug)]
pub struct FailedAttempt<'a> {
    pub source_id: &'a str,
    /// 1-based.
    pub attempt: u32,
    pub remaining: u32,
    /// Delay before the next attempt; `None` on the last one.
    pub next_delay: Option<Duration>,
    pub error: &'a AdapterError,
}

/// Observability hook called after every failed attempt, before the next one.
pub trait RetryObserver: Send + Sync {
    fn on_failed_attempt(&self, failure: &FailedAttempt<'_>);
}

/// Logs each failure and counts retries per source.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRetryObserver;

impl RetryObserver for LogRetryObserver {
    fn on_failed_attempt(&self, failure: &FailedAttempt<'_>) {
        warn!(
            target: "ingest",
            source = failure.source_id,
            attempt = failure.attempt,
            remaining = failure.remaining,
            delay_ms = failure.next_delay.map(|d| d.as_millis() as u64),
            error = %failure.error,
            "source fetch attempt failed"
        );
        if failure.remaining > 0 {
            counter!("feed_source_retries_total", "source" => failure.source_id.to_string())
                .increment(1);
        }
    }
}

/// Call `f` until it succeeds or `policy.max_attempts` is used up.
///
/// The delay between attempts only suspends the calling task. After the last
/// failure the final error is wrapped in a [`FinalError`].
pub async fn with_retry<F, Fut, T>(
    source_id: &str,
    policy: &RetryPolicy,
    observer: &dyn RetryObserver,
    mut f: F,
) -> Result<T, FinalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match f().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let remaining = max_attempts - attempt;
        let next_delay = (remaining > 0)
            .then(|| backoff.next_backoff().unwrap_or_else(|| policy.initial_delay()));

        observer.on_failed_attempt(&FailedAttempt {
            source_id,
            attempt,
            remaining,
            next_delay,
            error: &error,
        });

        match next_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => {
                return Err(FinalError {
                    source_id: source_id.to_string(),
                    attempts: attempt,
                    cause: error,
                })
            }
        }
    }
}
