// src/cache/postgres.rs
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::CacheProvider;
use crate::error::CacheError;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS cache (
        key        TEXT PRIMARY KEY,
        payload    JSONB NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS cache_expires_at_idx ON cache (expires_at)";

/// Relational backend: one `cache` table, upsert on write, expiry filtered on
/// read. [`CacheProvider::purge_expired`] uses the `expires_at` index.
#[derive(Debug, Clone)]
pub struct PostgresCache {
    pool: PgPool,
}

impl PostgresCache {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CacheError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        info!(target: "cache", max_connections, "postgres pool connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheProvider for PostgresCache {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_ready(&self) -> Result<(), CacheError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_EXPIRY_INDEX).execute(&self.pool).await?;
        debug!(target: "cache", "cache table ready");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let payload = sqlx::query_scalar::<_, Value>(
            "SELECT payload FROM cache WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payload)
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), CacheError> {
        if ttl_secs == 0 {
            return self.delete(key).await;
        }
        sqlx::query(
            r#"
            INSERT INTO cache (key, payload, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE SET
                payload = EXCLUDED.payload,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl_secs as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let done = sqlx::query("DELETE FROM cache WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.pool.close().await;
        Ok(())
    }
}
