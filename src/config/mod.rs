// src/config/mod.rs
//! Process-wide configuration, read once at startup.
//!
//! Lookup order:
//! 1) $FEED_CONFIG_PATH
//! 2) config/feed.toml
//! 3) built-in defaults (no sources, in-memory cache)
//!
//! Any string value written as `env:VAR` is replaced by that variable's value.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::aggregator::{AggregatorSettings, DEFAULT_CACHE_KEY, DEFAULT_TTL_SECS};
use crate::cache::CacheSettings;
use crate::ingest::providers::{HttpSettings, SourceSettings};
use crate::ingest::retry::RetryPolicy;
use crate::ingest::scheduler::SchedulerCfg;
use crate::ingest::NormalizeSettings;
use crate::relevance::ScoringConfig;

pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed.toml";
const ENV_REF_PREFIX: &str = "env:";

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_cache_key() -> String {
    DEFAULT_CACHE_KEY.to_string()
}
fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}
fn default_refresh_interval_secs() -> u64 {
    600
}
fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// How long `GET /feed` waits before answering 504.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            cache_key: default_cache_key(),
            ttl_secs: default_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub normalize: NormalizeSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
}

impl AppConfig {
    /// Parse TOML text, resolve `env:` references, validate.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut table: toml::Table = toml::from_str(s).context("parsing config TOML")?;
        for (key, value) in table.iter_mut() {
            resolve_env_refs(value, key)?;
        }
        let resolved = toml::to_string(&table).context("re-encoding resolved config")?;
        let cfg: AppConfig =
            toml::from_str(&resolved).context("config does not match the expected shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("loading {}", path.display()))
    }

    /// Env path, then the default path, then built-in defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from(&pb);
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        tracing::warn!(path = DEFAULT_CONFIG_PATH, "no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed.ttl_secs == 0 {
            bail!("feed.ttl_secs must be > 0");
        }
        if self.feed.refresh_interval_secs == 0 {
            bail!("feed.refresh_interval_secs must be > 0");
        }
        if self.feed.sweep_interval_secs == 0 {
            bail!("feed.sweep_interval_secs must be > 0");
        }
        if self.feed.cache_key.trim().is_empty() {
            bail!("feed.cache_key must not be empty");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be >= 1");
        }
        let half_life = self.scoring.half_life_hours;
        if half_life.is_nan() || half_life <= 0.0 {
            bail!("scoring.half_life_hours must be > 0");
        }

        let mut seen = HashSet::new();
        for s in &self.sources {
            if s.id.trim().is_empty() {
                bail!("source id must not be empty");
            }
            if !seen.insert(s.id.as_str()) {
                bail!("duplicate source id `{}`", s.id);
            }
            if s.rate_limit.max_requests == 0 {
                bail!("source `{}`: rate_limit.max_requests must be > 0", s.id);
            }
            if s.rate_limit.window_ms == 0 {
                bail!("source `{}`: rate_limit.window_ms must be > 0", s.id);
            }
            if s.rate_limit.concurrency == 0 {
                bail!("source `{}`: rate_limit.concurrency must be > 0", s.id);
            }
        }
        Ok(())
    }

    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            cache_key: self.feed.cache_key.clone(),
            ttl_secs: self.feed.ttl_secs,
            retry: self.retry,
            scoring: self.scoring.clone(),
            normalize: self.normalize,
        }
    }

    pub fn scheduler_cfg(&self) -> SchedulerCfg {
        SchedulerCfg {
            refresh_interval: Duration::from_secs(self.feed.refresh_interval_secs),
            sweep_interval: Duration::from_secs(self.feed.sweep_interval_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs.max(1))
    }
}

fn resolve_env_refs(value: &mut toml::Value, path: &str) -> Result<()> {
    match value {
        toml::Value::String(s) => {
            if let Some(var) = s.strip_prefix(ENV_REF_PREFIX) {
                let var = var.trim();
                *s = std::env::var(var)
                    .map_err(|_| anyhow!("`{path}` refers to unset environment variable {var}"))?;
            }
        }
        toml::Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                resolve_env_refs(item, &format!("{path}[{i}]"))?;
            }
        }
        toml::Value::Table(table) => {
            for (key, item) in table.iter_mut() {
                resolve_env_refs(item, &format!("{path}.{key}"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.feed.ttl_secs, 300);
        assert_eq!(cfg.feed.refresh_interval_secs, 600);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.scoring.half_life_hours, 6.0);
        assert_eq!(cfg.normalize.topic_limit, 8);
        assert_eq!(cfg.http.timeout_secs, 20);
        assert_eq!(cfg.cache, CacheSettings::Memory);
        assert!(cfg.sources.is_empty());
    }

    #[test]
    fn validation_rejects_bad_values() {
        for bad in [
            "[feed]\nttl_secs = 0",
            "[feed]\nrefresh_interval_secs = 0",
            "[retry]\nmax_attempts = 0",
            "[scoring]\nhalf_life_hours = 0.0",
            "[scoring]\nhalf_life_hours = -2.0",
        ] {
            assert!(AppConfig::from_toml_str(bad).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn duplicate_source_ids_are_rejected() {
        let doc = r#"
            [[sources]]
            id = "a"
            kind = "rss"
            url = "https://e/1"

            [[sources]]
            id = "a"
            kind = "rss"
            url = "https://e/2"
        "#;
        let err = AppConfig::from_toml_str(doc).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate source id"));
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let doc = r#"
            [[sources]]
            id = "a"
            kind = "rss"
            url = "https://e/1"
            rate_limit = { max_requests = 0 }
        "#;
        assert!(AppConfig::from_toml_str(doc).is_err());
    }

    #[test]
    fn keyword_boosts_feed_the_aggregator_settings() {
        let doc = r#"
            [feed]
            ttl_secs = 120
            cache_key = "feed:test"

            [scoring]
            half_life_hours = 12.0
            keyword_boosts = { poll = 1.5, rally = 1.25 }
        "#;
        let cfg = AppConfig::from_toml_str(doc).unwrap();
        let agg = cfg.aggregator_settings();
        assert_eq!(agg.ttl_secs, 120);
        assert_eq!(agg.cache_key, "feed:test");
        assert_eq!(agg.scoring.keyword_boosts.get("poll"), Some(&1.5));
        assert_eq!(cfg.scheduler_cfg().refresh_interval, Duration::from_secs(600));
    }
}
