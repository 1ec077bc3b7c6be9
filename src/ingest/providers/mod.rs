// src/ingest/providers/mod.rs
//! Source adapters, one per upstream format, plus the factory that turns
//! `[[sources]]` config entries into [`SourceConfig`]s.

pub mod content_api;
pub mod fixture;
pub mod news_api;
pub mod rss;
pub mod social;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AdapterCause, AdapterError};
use crate::ingest::queue::RateLimit;
use crate::ingest::types::{SourceAdapter, SourceConfig};

pub use content_api::ContentApiAdapter;
pub use fixture::FixtureAdapter;
pub use news_api::NewsApiAdapter;
pub use rss::RssAdapter;
pub use social::SocialAdapter;

fn default_user_agent() -> String {
    concat!("feedhub/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

/// `[http]` section shared by every HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// One client for all adapters (connection pool, UA and timeout).
pub fn build_client(http: &HttpSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(http.user_agent.clone())
        .timeout(Duration::from_secs(http.timeout_secs.max(1)))
        .build()
        .context("building HTTP client")
}

/// Upstream format of a configured source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    Rss {
        url: String,
    },
    NewsApi {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    ContentApi {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    Social {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    Fixture {
        path: PathBuf,
    },
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceSettings {
    pub id: String,
    /// Display label; defaults to `id`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: SourceKind,
    #[serde(default)]
    pub rate_limit: RateLimit,
}

impl SourceSettings {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Instantiate the adapter for every configured source, in config order.
pub fn build_sources(sources: &[SourceSettings], client: &reqwest::Client) -> Vec<SourceConfig> {
    sources
        .iter()
        .map(|s| {
            let id = s.id.clone();
            let name = s.display_name().to_string();
            let adapter: Arc<dyn SourceAdapter> = match &s.kind {
                SourceKind::Rss { url } => {
                    Arc::new(RssAdapter::new(id.clone(), name, url.clone(), client.clone()))
                }
                SourceKind::NewsApi { url, api_key } => Arc::new(NewsApiAdapter::new(
                    id.clone(),
                    name,
                    url.clone(),
                    api_key.clone(),
                    client.clone(),
                )),
                SourceKind::ContentApi { url, api_key } => Arc::new(ContentApiAdapter::new(
                    id.clone(),
                    name,
                    url.clone(),
                    api_key.clone(),
                    client.clone(),
                )),
                SourceKind::Social { url, api_key } => Arc::new(SocialAdapter::new(
                    id.clone(),
                    name,
                    url.clone(),
                    api_key.clone(),
                    client.clone(),
                )),
                SourceKind::Fixture { path } => {
                    Arc::new(FixtureAdapter::new(id.clone(), name, path.clone()))
                }
            };
            SourceConfig::new(id, s.rate_limit, adapter)
        })
        .collect()
}

/// Send `req` and return the body of a 2xx response.
pub(crate) async fn fetch_body(
    source_id: &str,
    req: reqwest::RequestBuilder,
) -> Result<String, AdapterError> {
    let resp = req
        .send()
        .await
        .map_err(|e| AdapterError::new(source_id, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AdapterError::new(
            source_id,
            AdapterCause::Status(status.as_u16()),
        ));
    }
    resp.text().await.map_err(|e| AdapterError::new(source_id, e))
}

/// Take the array at JSON `pointer` out of `body`.
///
/// Invalid JSON or a missing/non-array field fails the whole fetch; what the
/// elements look like is the caller's business.
pub(crate) fn json_records(
    source_id: &str,
    body: &str,
    pointer: &str,
) -> Result<Vec<Value>, AdapterError> {
    let mut root: Value = serde_json::from_str(body)
        .map_err(|e| AdapterError::malformed(source_id, format!("invalid JSON: {e}")))?;
    match root.pointer_mut(pointer).map(Value::take) {
        Some(Value::Array(records)) => Ok(records),
        _ => Err(AdapterError::malformed(
            source_id,
            format!("missing `{pointer}` array"),
        )),
    }
}

/// Trimmed, non-empty.
pub(crate) fn present(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// RFC 3339 timestamp, or `fallback` when absent or unparseable.
pub(crate) fn rfc3339_or(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_deserialize_with_kind_tag_and_defaults() {
        #[derive(Deserialize)]
        struct Wrapper {
            sources: Vec<SourceSettings>,
        }
        let w: Wrapper = toml::from_str(
            r#"
            [[sources]]
            id = "wire"
            kind = "rss"
            url = "https://example.org/rss"

            [[sources]]
            id = "news"
            name = "News API"
            kind = "news_api"
            url = "https://newsapi.example/v2/top"
            api_key = "k"
            rate_limit = { window_ms = 2000, max_requests = 1 }
            "#,
        )
        .unwrap();

        assert_eq!(w.sources.len(), 2);
        assert_eq!(w.sources[0].display_name(), "wire");
        assert_eq!(w.sources[0].rate_limit, RateLimit::default());
        assert!(matches!(w.sources[0].kind, SourceKind::Rss { .. }));
        assert_eq!(w.sources[1].display_name(), "News API");
        assert_eq!(w.sources[1].rate_limit, RateLimit::new(2_000, 1));
    }

    #[test]
    fn json_records_requires_the_array() {
        assert_eq!(json_records("s", r#"{"data":[1,2]}"#, "/data").unwrap().len(), 2);
        assert!(json_records("s", r#"{"data":{}}"#, "/data").is_err());
        assert!(json_records("s", r#"{"other":[]}"#, "/data").is_err());
        let err = json_records("s", "<html>", "/data").unwrap_err();
        assert!(matches!(err.cause, AdapterCause::Malformed(_)));
    }

    #[test]
    fn rfc3339_falls_back() {
        let fallback = Utc::now();
        let parsed = rfc3339_or(Some("2026-05-04T10:00:00+02:00"), fallback);
        assert_eq!(parsed.to_rfc3339(), "2026-05-04T08:00:00+00:00");
        assert_eq!(rfc3339_or(Some("yesterday"), fallback), fallback);
        assert_eq!(rfc3339_or(None, fallback), fallback);
    }

    #[test]
    fn build_sources_keeps_config_order() {
        let settings = vec![
            SourceSettings {
                id: "b".into(),
                name: None,
                kind: SourceKind::Fixture {
                    path: "tests/fixtures/canonical_items.json".into(),
                },
                rate_limit: RateLimit::default(),
            },
            SourceSettings {
                id: "a".into(),
                name: Some("Wire".into()),
                kind: SourceKind::Rss {
                    url: "https://example.org/rss".into(),
                },
                rate_limit: RateLimit::new(1_000, 1),
            },
        ];
        let built = build_sources(&settings, &reqwest::Client::new());
        let ids: Vec<_> = built.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(built[1].adapter.name(), "Wire");
        assert_eq!(built[1].rate_limit.max_requests, 1);
    }
}
