// src/ingest/types.rs
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::ingest::queue::RateLimit;

/// A content record after source-specific parsing.
///
/// `id` is source-local (not globally unique before dedup). `relevance_score`
/// stays `None` until the scorer runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl CanonicalItem {
    /// Minimal item; `id` is derived from the link.
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        published_at: DateTime<Utc>,
        source_name: impl Into<String>,
    ) -> Self {
        let link = link.into();
        Self {
            id: id_from_link(&link),
            title: title.into(),
            link,
            published_at,
            summary: String::new(),
            source_name: source_name.into(),
            category: None,
            image_url: None,
            topics: BTreeSet::new(),
            relevance_score: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// Stable short id for records whose upstream has none.
pub fn id_from_link(link: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(link.trim().as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Converts one upstream's native response into canonical items.
///
/// Adapters fail as a whole only on network errors, non-2xx responses or a
/// payload missing its expected top-level shape. Individual bad records are
/// skipped.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CanonicalItem>, AdapterError>;
    /// Human-readable upstream label.
    fn name(&self) -> &str;
}

/// Static per-source descriptor, immutable after startup.
#[derive(Clone)]
pub struct SourceConfig {
    pub id: String,
    pub rate_limit: RateLimit,
    pub adapter: Arc<dyn SourceAdapter>,
}

impl SourceConfig {
    pub fn new(id: impl Into<String>, rate_limit: RateLimit, adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            id: id.into(),
            rate_limit,
            adapter,
        }
    }

    pub async fn fetch(&self) -> Result<Vec<CanonicalItem>, AdapterError> {
        self.adapter.fetch().await
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("id", &self.id)
            .field("rate_limit", &self.rate_limit)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotOrigin {
    /// Produced by the current aggregation cycle.
    Live,
    /// Served from the cache provider.
    Cache,
    /// In-process fallback after every source failed.
    Stale,
}

/// The aggregator's output. Replaced wholesale, never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub items: Vec<CanonicalItem>,
    pub fetched_at: DateTime<Utc>,
    pub source: SnapshotOrigin,
}

impl FeedSnapshot {
    pub fn with_origin(mut self, origin: SnapshotOrigin) -> Self {
        self.source = origin;
        self
    }
}
