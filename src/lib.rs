// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod relevance;

// ---- Re-exports for stable public API ----
pub use crate::aggregator::{Aggregator, AggregatorSettings, SourceStatus};
pub use crate::api::{create_router, AppState};
pub use crate::cache::{CacheProvider, CacheSettings};
pub use crate::config::AppConfig;
pub use crate::error::{AdapterCause, AdapterError, AggregationFailure, CacheError, FinalError};
pub use crate::ingest::types::{
    CanonicalItem, FeedSnapshot, SnapshotOrigin, SourceAdapter, SourceConfig,
};
