// src/cache/redis.rs
use std::fmt;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde_json::Value;
use tracing::{debug, info};

use super::CacheProvider;
use crate::error::CacheError;

/// External key-value backend. Expiry is enforced by the server (`SET .. EX`).
///
/// Payloads are stored as JSON strings under `key_prefix + key`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    key_prefix: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("key_prefix", &self.key_prefix)
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCache {
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let key_prefix = key_prefix.into();
        info!(target: "cache", %key_prefix, "redis connection manager initialized");
        Ok(Self { conn, key_prefix })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheProvider for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ensure_ready(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(target: "cache", %pong, "redis reachable");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(key)).await?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), CacheError> {
        if ttl_secs == 0 {
            return self.delete(key).await;
        }
        let payload = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.key(key), payload, ttl_secs)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(key)).await?;
        Ok(())
    }
}
