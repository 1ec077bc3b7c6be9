// src/aggregator.rs
//! Aggregation orchestrator: cache-aside `get_feed`, the fetch → normalize →
//! dedupe → score → cache cycle, and per-source health.
//!
//! One long-lived [`Aggregator`] is built at startup and cloned into HTTP
//! handlers and background tasks; clones share all state (queues, statuses,
//! last snapshot).
//!
//! Overlapping cycles (a forced refresh racing the scheduled one) are not
//! serialized. Both write the cache and the last `set` wins.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{self, CacheProvider};
use crate::error::{AdapterError, AggregationFailure, FinalError};
use crate::ingest::dedup::dedupe_with_stats;
use crate::ingest::queue::QueueRegistry;
use crate::ingest::retry::{with_retry, LogRetryObserver, RetryObserver, RetryPolicy};
use crate::ingest::types::{CanonicalItem, FeedSnapshot, SnapshotOrigin, SourceConfig};
use crate::ingest::{normalize, NormalizeSettings};
use crate::metrics::ensure_metrics_described;
use crate::relevance::{rank, RelevanceScorer, ScoringConfig};

pub const DEFAULT_CACHE_KEY: &str = "feed:snapshot";
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Pipeline knobs owned by the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub cache_key: String,
    pub ttl_secs: u64,
    pub retry: RetryPolicy,
    pub scoring: ScoringConfig,
    pub normalize: NormalizeSettings,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            retry: RetryPolicy::default(),
            scoring: ScoringConfig::default(),
            normalize: NormalizeSettings::default(),
        }
    }
}

/// Health of one source as of its last cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub id: String,
    pub name: String,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_item_count: usize,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

struct Inner {
    sources: Vec<SourceConfig>,
    queues: QueueRegistry,
    cache: Arc<dyn CacheProvider>,
    scorer: RelevanceScorer,
    settings: AggregatorSettings,
    observer: Arc<dyn RetryObserver>,
    statuses: Mutex<Vec<SourceStatus>>,
    last_snapshot: RwLock<Option<FeedSnapshot>>,
}

impl Aggregator {
    pub fn new(
        sources: Vec<SourceConfig>,
        cache: Arc<dyn CacheProvider>,
        settings: AggregatorSettings,
    ) -> Self {
        Self::with_observer(sources, cache, settings, Arc::new(LogRetryObserver))
    }

    pub fn with_observer(
        sources: Vec<SourceConfig>,
        cache: Arc<dyn CacheProvider>,
        settings: AggregatorSettings,
        observer: Arc<dyn RetryObserver>,
    ) -> Self {
        ensure_metrics_described();
        let statuses = sources
            .iter()
            .map(|s| SourceStatus {
                id: s.id.clone(),
                name: s.adapter.name().to_string(),
                ..SourceStatus::default()
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                scorer: RelevanceScorer::new(&settings.scoring),
                sources,
                queues: QueueRegistry::new(),
                cache,
                settings,
                observer,
                statuses: Mutex::new(statuses),
                last_snapshot: RwLock::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.inner.settings
    }

    pub fn cache(&self) -> &Arc<dyn CacheProvider> {
        &self.inner.cache
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.inner.sources.iter().map(|s| s.id.clone()).collect()
    }

    /// Per-source health in configured order.
    pub fn source_statuses(&self) -> Vec<SourceStatus> {
        self.inner
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last snapshot this process produced, if any.
    pub fn last_snapshot(&self) -> Option<FeedSnapshot> {
        self.inner
            .last_snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cache-aside read. Without `force_refresh`, an unexpired cache entry is
    /// returned as-is and no source is touched.
    pub async fn get_feed(&self, force_refresh: bool) -> Result<FeedSnapshot, AggregationFailure> {
        if !force_refresh {
            if let Some(snapshot) = self.inner.read_cached().await {
                counter!("feed_cache_hits_total").increment(1);
                debug!(target: "aggregator", items = snapshot.items.len(), "feed served from cache");
                return Ok(snapshot);
            }
            counter!("feed_cache_misses_total").increment(1);
        }
        self.refresh().await
    }

    /// Run one full aggregation cycle and write the result to the cache.
    ///
    /// The cycle runs on its own task: if the caller stops waiting, it still
    /// completes and updates the cache for the next reader.
    pub async fn refresh(&self) -> Result<FeedSnapshot, AggregationFailure> {
        let inner = self.inner.clone();
        match tokio::spawn(async move { inner.run_cycle().await }).await {
            Ok(result) => result,
            Err(e) => {
                warn!(target: "aggregator", error = %e, "aggregation task aborted");
                counter!("feed_refresh_total", "outcome" => "aborted").increment(1);
                Err(AggregationFailure {
                    failed_sources: self.source_ids(),
                    detail: format!("aggregation task aborted: {e}"),
                })
            }
        }
    }
}

impl Inner {
    async fn read_cached(&self) -> Option<FeedSnapshot> {
        match cache::get_json::<FeedSnapshot>(self.cache.as_ref(), &self.settings.cache_key).await {
            Ok(Some(snapshot)) => Some(snapshot.with_origin(SnapshotOrigin::Cache)),
            Ok(None) => None,
            Err(e) => {
                warn!(target: "cache", provider = self.cache.name(), error = %e, "cache read failed");
                counter!("feed_cache_errors_total", "op" => "get").increment(1);
                None
            }
        }
    }

    async fn write_cached(&self, snapshot: &FeedSnapshot) {
        let key = &self.settings.cache_key;
        if let Err(e) = cache::set_json(self.cache.as_ref(), key, snapshot, self.settings.ttl_secs).await {
            warn!(target: "cache", provider = self.cache.name(), error = %e, "cache write failed");
            counter!("feed_cache_errors_total", "op" => "set").increment(1);
        }
    }

    async fn run_cycle(self: Arc<Self>) -> Result<FeedSnapshot, AggregationFailure> {
        let t0 = Instant::now();

        let mut set = JoinSet::new();
        for idx in 0..self.sources.len() {
            let inner = self.clone();
            set.spawn(async move {
                let result = inner.fetch_source(idx).await;
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<Vec<CanonicalItem>, FinalError>>> =
            (0..self.sources.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => warn!(target: "aggregator", error = %e, "source task aborted"),
            }
        }

        let mut raw = Vec::new();
        let mut failures = Vec::new();
        let mut succeeded = 0usize;
        for (idx, result) in results.into_iter().enumerate() {
            match result {
                Some(Ok(mut items)) => {
                    succeeded += 1;
                    raw.append(&mut items);
                }
                Some(Err(e)) => failures.push(e),
                None => failures.push(FinalError {
                    source_id: self.sources[idx].id.clone(),
                    attempts: 0,
                    cause: AdapterError::malformed(&self.sources[idx].id, "fetch task aborted"),
                }),
            }
        }

        if succeeded == 0 && !failures.is_empty() {
            histogram!("feed_refresh_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            return self.fall_back(&failures).await;
        }

        let snapshot = self.merge(raw);
        let outcome = if failures.is_empty() { "ok" } else { "partial" };

        *self
            .last_snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        self.write_cached(&snapshot).await;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("feed_refresh_duration_ms").record(ms);
        counter!("feed_refresh_total", "outcome" => outcome).increment(1);
        gauge!("feed_last_refresh_ts").set(snapshot.fetched_at.timestamp() as f64);
        info!(
            target: "aggregator",
            items = snapshot.items.len(),
            sources_ok = succeeded,
            sources_failed = failures.len(),
            duration_ms = ms as u64,
            "aggregation cycle finished"
        );
        Ok(snapshot)
    }

    /// Concatenate in source order, then normalize, dedupe, score and rank.
    fn merge(&self, raw: Vec<CanonicalItem>) -> FeedSnapshot {
        let raw_len = raw.len();
        let normalized = normalize(raw, &self.settings.normalize);
        counter!("feed_items_dropped_total").increment((raw_len - normalized.len()) as u64);

        let (mut items, stats) = dedupe_with_stats(normalized);
        counter!("feed_items_deduped_total").increment((stats.dropped + stats.replaced) as u64);

        let now = Utc::now();
        self.scorer.score_all(&mut items, now);
        rank(&mut items);

        FeedSnapshot {
            items,
            fetched_at: now,
            source: SnapshotOrigin::Live,
        }
    }

    /// Every source failed: serve what we still have, never overwrite the cache.
    async fn fall_back(&self, failures: &[FinalError]) -> Result<FeedSnapshot, AggregationFailure> {
        counter!("feed_refresh_total", "outcome" => "failed").increment(1);

        if let Some(snapshot) = self.read_cached().await {
            warn!(target: "aggregator", failed = failures.len(), "all sources failed, serving cached feed");
            return Ok(snapshot);
        }
        let last = self
            .last_snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(snapshot) = last {
            warn!(target: "aggregator", failed = failures.len(), "all sources failed, serving stale feed");
            return Ok(snapshot.with_origin(SnapshotOrigin::Stale));
        }

        let failure = AggregationFailure::from_final_errors(failures);
        warn!(target: "aggregator", detail = %failure.detail, "all sources failed and nothing to fall back on");
        Err(failure)
    }

    /// queue → retry → adapter, with every attempt paced by the source's queue.
    async fn fetch_source(&self, idx: usize) -> Result<Vec<CanonicalItem>, FinalError> {
        let source = &self.sources[idx];
        let queue = self.queues.queue_for(&source.id, source.rate_limit);
        let queue = &queue;

        let attempted_at = Utc::now();
        let result = with_retry(&source.id, &self.settings.retry, self.observer.as_ref(), || async move {
            queue.enqueue(|| source.fetch()).await
        })
        .await;

        match &result {
            Ok(items) => {
                counter!("feed_source_fetch_total", "source" => source.id.clone(), "outcome" => "ok")
                    .increment(1);
                counter!("feed_source_items_total", "source" => source.id.clone())
                    .increment(items.len() as u64);
                debug!(target: "ingest", source = %source.id, items = items.len(), "source fetched");
            }
            Err(e) => {
                counter!("feed_source_fetch_total", "source" => source.id.clone(), "outcome" => "error")
                    .increment(1);
                warn!(target: "ingest", source = %source.id, attempts = e.attempts, error = %e, "source failed");
            }
        }
        self.record_status(idx, attempted_at, &result);
        result
    }

    fn record_status(
        &self,
        idx: usize,
        attempted_at: DateTime<Utc>,
        result: &Result<Vec<CanonicalItem>, FinalError>,
    ) {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(status) = statuses.get_mut(idx) else {
            return;
        };
        status.last_attempt = Some(attempted_at);
        match result {
            Ok(items) => {
                status.last_success = Some(Utc::now());
                status.last_item_count = items.len();
                status.last_error = None;
                status.consecutive_failures = 0;
            }
            Err(e) => {
                status.last_item_count = 0;
                status.last_error = Some(e.to_string());
                status.consecutive_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::AdapterCause;
    use crate::ingest::queue::RateLimit;
    use crate::ingest::types::SourceAdapter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Scripted {
        name: String,
        calls: AtomicUsize,
        items: Vec<CanonicalItem>,
        fail: bool,
    }

    #[async_trait]
    impl SourceAdapter for Scripted {
        async fn fetch(&self) -> Result<Vec<CanonicalItem>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AdapterError::new(&self.name, AdapterCause::Status(500)))
            } else {
                Ok(self.items.clone())
            }
        }
        fn name(&self) -> &str {
            &self.name
        }
    }

    fn scripted(name: &str, items: Vec<CanonicalItem>, fail: bool) -> Arc<Scripted> {
        Arc::new(Scripted {
            name: name.into(),
            calls: AtomicUsize::new(0),
            items,
            fail,
        })
    }

    fn fast_settings() -> AggregatorSettings {
        AggregatorSettings {
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
            ..AggregatorSettings::default()
        }
    }

    fn item(title: &str, link: &str) -> CanonicalItem {
        CanonicalItem::new(title, link, Utc::now() - chrono::Duration::hours(1), "S")
    }

    #[tokio::test]
    async fn failing_source_is_recorded_in_status() {
        let ok = scripted("ok", vec![item("Foo", "http://x/1")], false);
        let bad = scripted("bad", vec![], true);
        let agg = Aggregator::new(
            vec![
                SourceConfig::new("ok", RateLimit::default(), ok.clone()),
                SourceConfig::new("bad", RateLimit::default(), bad.clone()),
            ],
            Arc::new(MemoryCache::new()),
            fast_settings(),
        );

        let snap = agg.refresh().await.unwrap();
        assert_eq!(snap.items.len(), 1);
        assert_eq!(snap.source, SnapshotOrigin::Live);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 2);

        agg.refresh().await.unwrap();
        let statuses = agg.source_statuses();
        assert_eq!(statuses[0].id, "ok");
        assert_eq!(statuses[0].consecutive_failures, 0);
        assert_eq!(statuses[0].last_item_count, 1);
        assert!(statuses[0].last_success.is_some());
        assert_eq!(statuses[1].id, "bad");
        assert_eq!(statuses[1].consecutive_failures, 2);
        assert!(statuses[1].last_error.as_deref().unwrap().contains("HTTP 500"));
        assert!(statuses[1].last_success.is_none());
    }

    #[tokio::test]
    async fn zero_sources_yield_an_empty_feed() {
        let agg = Aggregator::new(vec![], Arc::new(MemoryCache::new()), fast_settings());
        let snap = agg.get_feed(false).await.unwrap();
        assert!(snap.items.is_empty());
        assert_eq!(snap.source, SnapshotOrigin::Live);
    }

    #[tokio::test]
    async fn total_failure_falls_back_to_last_snapshot() {
        let flaky = Arc::new(Scripted {
            name: "flaky".into(),
            calls: AtomicUsize::new(0),
            items: vec![item("Foo", "http://x/1")],
            fail: false,
        });
        let cache = Arc::new(MemoryCache::new());
        let agg = Aggregator::new(
            vec![SourceConfig::new("flaky", RateLimit::default(), flaky.clone())],
            cache.clone(),
            fast_settings(),
        );
        agg.refresh().await.unwrap();

        // Cache gone, source broken: only the in-process copy is left.
        cache.delete(DEFAULT_CACHE_KEY).await.unwrap();
        let broken = scripted("flaky", vec![], true);
        let agg_broken = Aggregator {
            inner: Arc::new(Inner {
                sources: vec![SourceConfig::new("flaky", RateLimit::default(), broken)],
                queues: QueueRegistry::new(),
                cache: cache.clone(),
                scorer: RelevanceScorer::new(&ScoringConfig::default()),
                settings: fast_settings(),
                observer: Arc::new(LogRetryObserver),
                statuses: Mutex::new(vec![SourceStatus::default()]),
                last_snapshot: RwLock::new(agg.last_snapshot()),
            }),
        };

        let snap = agg_broken.get_feed(true).await.unwrap();
        assert_eq!(snap.source, SnapshotOrigin::Stale);
        assert_eq!(snap.items.len(), 1);
        // A failed cycle never writes the cache.
        assert!(cache.get(DEFAULT_CACHE_KEY).await.unwrap().is_none());
    }
}
