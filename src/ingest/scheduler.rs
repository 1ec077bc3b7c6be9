// src/ingest/scheduler.rs
//! Background jobs: periodic feed refresh and cache expiry sweeps.
//!
//! Both loops log failures and keep ticking; nothing here ever panics or
//! returns early on error.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::aggregator::Aggregator;
use crate::cache::CacheProvider;

/// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub refresh_interval: Duration,
    pub sweep_interval: Duration,
}

/// Refresh the feed every `interval`, independent of request traffic.
///
/// The first cycle runs immediately so the cache is warm at startup.
pub fn spawn_refresh_loop(aggregator: Aggregator, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match aggregator.refresh().await {
                Ok(snapshot) => tracing::info!(
                    target: "aggregator",
                    items = snapshot.items.len(),
                    origin = ?snapshot.source,
                    "scheduled refresh done"
                ),
                Err(e) => tracing::warn!(
                    target: "aggregator",
                    failed_sources = ?e.failed_sources,
                    error = %e,
                    "scheduled refresh failed"
                ),
            }
        }
    })
}

/// Periodically drop expired cache entries.
pub fn spawn_cache_sweeper(cache: Arc<dyn CacheProvider>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Nothing can be expired at startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match cache.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(target: "cache", purged = n, "expired cache entries removed"),
                Err(e) => {
                    counter!("feed_cache_errors_total", "op" => "purge").increment(1);
                    tracing::warn!(target: "cache", provider = cache.name(), error = %e, "cache sweep failed");
                }
            }
        }
    })
}

/// Start both background jobs.
pub fn spawn_all(aggregator: &Aggregator, cfg: SchedulerCfg) -> Vec<JoinHandle<()>> {
    vec![
        spawn_refresh_loop(aggregator.clone(), cfg.refresh_interval),
        spawn_cache_sweeper(aggregator.cache().clone(), cfg.sweep_interval),
    ]
}
