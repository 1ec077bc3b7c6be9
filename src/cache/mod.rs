// src/cache/mod.rs
//! Pluggable key → (JSON payload, expiry) store.
//!
//! Callers only see [`CacheProvider`]. The concrete backend is chosen once at
//! startup by [`build`] from typed [`CacheSettings`].

pub mod memory;
pub mod postgres;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::CacheError;

pub use self::memory::MemoryCache;
pub use self::postgres::PostgresCache;
pub use self::redis::RedisCache;

/// Shared contract of every backend.
///
/// * `get` right after `set` with `ttl_secs > 0` returns the stored value.
/// * `get` after the TTL elapsed returns `None`.
/// * `delete` makes the next `get` return `None` regardless of TTL.
/// * `set` with `ttl_secs == 0` stores nothing and removes the key.
///
/// Concurrent `get`/`set` on one key are last-writer-wins.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare backing storage (schema, connectivity). Idempotent.
    async fn ensure_ready(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove expired entries, returning how many were removed.
    /// Backends with native expiry have nothing to do.
    async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(0)
    }

    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Typed read on top of [`CacheProvider::get`].
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheProvider,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

/// Typed write on top of [`CacheProvider::set`].
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn CacheProvider,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<(), CacheError> {
    cache.set(key, serde_json::to_value(value)?, ttl_secs).await
}

fn default_key_prefix() -> String {
    "feedhub:".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// `[cache]` section: `provider = "memory" | "redis" | "postgres"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum CacheSettings {
    Memory,
    Redis {
        url: String,
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings::Memory
    }
}

impl CacheSettings {
    pub fn provider_name(&self) -> &'static str {
        match self {
            CacheSettings::Memory => "memory",
            CacheSettings::Redis { .. } => "redis",
            CacheSettings::Postgres { .. } => "postgres",
        }
    }
}

/// Connect the configured backend and run its schema bootstrap.
pub async fn build(settings: &CacheSettings) -> Result<Arc<dyn CacheProvider>, CacheError> {
    let cache: Arc<dyn CacheProvider> = match settings {
        CacheSettings::Memory => Arc::new(MemoryCache::new()),
        CacheSettings::Redis { url, key_prefix } => {
            Arc::new(RedisCache::connect(url, key_prefix.clone()).await?)
        }
        CacheSettings::Postgres {
            url,
            max_connections,
        } => Arc::new(PostgresCache::connect(url, *max_connections).await?),
    };
    cache.ensure_ready().await?;
    info!(target: "cache", provider = cache.name(), "cache provider ready");
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_are_tagged_by_provider() {
        let s: CacheSettings = toml::from_str(r#"provider = "memory""#).unwrap();
        assert_eq!(s, CacheSettings::Memory);

        let s: CacheSettings =
            toml::from_str("provider = \"redis\"\nurl = \"redis://127.0.0.1/\"").unwrap();
        assert_eq!(
            s,
            CacheSettings::Redis {
                url: "redis://127.0.0.1/".into(),
                key_prefix: "feedhub:".into()
            }
        );

        let s: CacheSettings = toml::from_str(
            "provider = \"postgres\"\nurl = \"postgres://u@h/db\"\nmax_connections = 2",
        )
        .unwrap();
        assert_eq!(s.provider_name(), "postgres");

        assert!(toml::from_str::<CacheSettings>(r#"provider = "memcached""#).is_err());
    }

    #[tokio::test]
    async fn factory_builds_memory_backend() {
        let cache = build(&CacheSettings::Memory).await.unwrap();
        assert_eq!(cache.name(), "memory");
        set_json(cache.as_ref(), "k", &vec![1, 2, 3], 60).await.unwrap();
        let back: Option<Vec<i32>> = get_json(cache.as_ref(), "k").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }
}
