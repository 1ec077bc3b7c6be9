// src/ingest/queue.rs
//! Per-source rate-limited queues.
//!
//! Each source owns exactly one [`RateLimitedQueue`], created lazily by the
//! [`QueueRegistry`] and reused for the lifetime of the aggregator. A queue
//! admits at most `max_requests` task starts inside any rolling `window_ms`
//! window and runs `concurrency` tasks at a time (1 by default). Tasks over the
//! limit are delayed, never dropped. Queues never share state, so one busy
//! source cannot stall another.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

fn default_window_ms() -> u64 {
    1_000
}
fn default_max_requests() -> u32 {
    5
}
fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            concurrency: default_concurrency(),
        }
    }
}

impl RateLimit {
    /// Sequential queue (`concurrency = 1`) with the given throughput cap.
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
            concurrency: 1,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

pub struct RateLimitedQueue {
    source_id: String,
    limit: RateLimit,
    permits: Semaphore,
    /// Start instants of tasks admitted inside the current window, oldest first.
    starts: Mutex<VecDeque<Instant>>,
}

impl RateLimitedQueue {
    pub fn new(source_id: impl Into<String>, limit: RateLimit) -> Self {
        Self {
            source_id: source_id.into(),
            limit,
            permits: Semaphore::new(limit.concurrency.max(1)),
            starts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Run `task` once the queue admits it and return its output.
    ///
    /// The task's own failure is just its output; it does not affect tasks
    /// queued behind it.
    pub async fn enqueue<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // The semaphore is never closed, so acquire only fails in theory.
        let _permit = self.permits.acquire().await.ok();
        self.reserve_slot().await;
        task().await
    }

    /// Wait until a start is allowed, then record it.
    async fn reserve_slot(&self) {
        let window = self.limit.window();
        let max = self.limit.max_requests.max(1) as usize;

        loop {
            let deadline = {
                let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                while let Some(&oldest) = starts.front() {
                    if now.duration_since(oldest) >= window {
                        starts.pop_front();
                    } else {
                        break;
                    }
                }
                if starts.len() < max {
                    starts.push_back(now);
                    return;
                }
                match starts.front() {
                    Some(&oldest) => oldest + window,
                    None => return,
                }
            };

            debug!(
                target: "ingest",
                source = %self.source_id,
                wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                "rate limit reached, delaying task"
            );
            sleep_until(deadline).await;
        }
    }
}

/// Lazily-created, reused queues keyed by source id.
#[derive(Default)]
pub struct QueueRegistry {
    queues: Mutex<HashMap<String, Arc<RateLimitedQueue>>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue for `source_id`; created on first use with `limit`.
    pub fn queue_for(&self, source_id: &str, limit: RateLimit) -> Arc<RateLimitedQueue> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(RateLimitedQueue::new(source_id, limit)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
