//! Feed aggregation service, binary entrypoint.
//! Loads config, builds the cache provider, sources and aggregator, starts the
//! background jobs and serves the HTTP API.

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedhub::{
    api::{create_router, AppState},
    cache,
    config::AppConfig,
    ingest::{
        providers::{build_client, build_sources},
        scheduler,
    },
    metrics::Metrics,
    Aggregator,
};

const DEFAULT_LOG_FILTER: &str = "feedhub=info,ingest=info,cache=info,aggregator=info,warn";

/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    let metrics = Metrics::init(cfg.feed.ttl_secs)?;

    let cache = cache::build(&cfg.cache)
        .await
        .with_context(|| format!("initializing {} cache", cfg.cache.provider_name()))?;

    let client = build_client(&cfg.http)?;
    let sources = build_sources(&cfg.sources, &client);
    info!(
        sources = sources.len(),
        cache = cache.name(),
        ttl_secs = cfg.feed.ttl_secs,
        "aggregator configured"
    );
    let aggregator = Aggregator::new(sources, cache.clone(), cfg.aggregator_settings());

    let jobs = scheduler::spawn_all(&aggregator, cfg.scheduler_cfg());

    let app = create_router(AppState::new(aggregator, cfg.request_timeout())).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    info!(bind = %cfg.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    for job in jobs {
        job.abort();
    }
    if let Err(e) = cache.close().await {
        warn!(target: "cache", error = %e, "cache close failed");
    }
    info!("shut down");
    Ok(())
}
