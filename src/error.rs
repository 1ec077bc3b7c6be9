// src/error.rs
//! Error taxonomy for the aggregation pipeline.
//!
//! Errors are contained at the smallest scope: an [`AdapterError`] is retried,
//! a [`FinalError`] is recorded per source, a [`CacheError`] is logged. Only an
//! [`AggregationFailure`] ever reaches an external caller.

use thiserror::Error;

/// Why a single adapter invocation failed.
#[derive(Debug, Error)]
pub enum AdapterCause {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream responded with HTTP {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("reading local payload: {0}")]
    Io(#[from] std::io::Error),
}

/// One source failed once. Recoverable by retry.
#[derive(Debug, Error)]
#[error("source `{source_id}`: {cause}")]
pub struct AdapterError {
    pub source_id: String,
    #[source]
    pub cause: AdapterCause,
}

impl AdapterError {
    pub fn new(source_id: impl Into<String>, cause: impl Into<AdapterCause>) -> Self {
        Self {
            source_id: source_id.into(),
            cause: cause.into(),
        }
    }

    pub fn malformed(source_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(source_id, AdapterCause::Malformed(detail.into()))
    }
}

/// One source failed on every attempt. Recorded, never propagated past the aggregator.
#[derive(Debug, Error)]
#[error("source `{source_id}` failed after {attempts} attempt(s): {cause}")]
pub struct FinalError {
    pub source_id: String,
    pub attempts: u32,
    #[source]
    pub cause: AdapterError,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("payload (de)serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache backend: {0}")]
    Backend(String),
}

/// Every source failed and there was nothing cached to fall back on.
#[derive(Debug, Error)]
#[error("feed aggregation failed: {detail}")]
pub struct AggregationFailure {
    pub failed_sources: Vec<String>,
    pub detail: String,
}

impl AggregationFailure {
    pub fn from_final_errors(errors: &[FinalError]) -> Self {
        let failed_sources = errors.iter().map(|e| e.source_id.clone()).collect();
        let detail = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            failed_sources,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_error_message_names_source_and_attempts() {
        let err = FinalError {
            source_id: "wire".into(),
            attempts: 3,
            cause: AdapterError::new("wire", AdapterCause::Status(503)),
        };
        let msg = err.to_string();
        assert!(msg.contains("`wire`"));
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn aggregation_failure_lists_every_source() {
        let errors = vec![
            FinalError {
                source_id: "a".into(),
                attempts: 1,
                cause: AdapterError::malformed("a", "missing `articles`"),
            },
            FinalError {
                source_id: "b".into(),
                attempts: 2,
                cause: AdapterError::new("b", AdapterCause::Status(500)),
            },
        ];
        let failure = AggregationFailure::from_final_errors(&errors);
        assert_eq!(failure.failed_sources, vec!["a".to_string(), "b".to_string()]);
        assert!(failure.detail.contains("missing `articles`"));
        assert!(failure.detail.contains("HTTP 500"));
    }
}
