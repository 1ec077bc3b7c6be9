// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_source_fetch_total",
            "Source fetches after retries, by source and outcome."
        );
        describe_counter!(
            "feed_source_retries_total",
            "Failed attempts that were retried, by source."
        );
        describe_counter!(
            "feed_source_items_total",
            "Raw items returned by each source."
        );
        describe_counter!("feed_cache_hits_total", "Feed reads served from cache.");
        describe_counter!(
            "feed_cache_misses_total",
            "Feed reads that found no usable cache entry."
        );
        describe_counter!(
            "feed_cache_errors_total",
            "Cache provider failures, by operation."
        );
        describe_counter!(
            "feed_items_dropped_total",
            "Items dropped by the normalizer (missing id, title or link)."
        );
        describe_counter!(
            "feed_items_deduped_total",
            "Items merged away by deduplication."
        );
        describe_counter!("feed_refresh_total", "Aggregation cycles, by outcome.");
        describe_histogram!(
            "feed_refresh_duration_ms",
            "Aggregation cycle duration in milliseconds."
        );
        describe_gauge!(
            "feed_last_refresh_ts",
            "Unix ts of the last cycle that produced a snapshot."
        );
        describe_gauge!("feed_cache_ttl_secs", "Configured feed cache TTL.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the configured cache TTL.
    pub fn init(ttl_secs: u64) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        ensure_metrics_described();
        gauge!("feed_cache_ttl_secs").set(ttl_secs as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
