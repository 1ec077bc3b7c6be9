// src/ingest/providers/news_api.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{fetch_body, json_records, present, rfc3339_or};
use crate::error::AdapterError;
use crate::ingest::types::{CanonicalItem, SourceAdapter};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Article {
    title: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url_to_image: Option<String>,
    source: Option<Publisher>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Publisher {
    name: Option<String>,
}

/// `{ "articles": [...] }`. The publisher name, when present, becomes the
/// item's `source_name`.
pub fn parse_articles(
    source_id: &str,
    source_name: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Vec<CanonicalItem>, AdapterError> {
    let records = json_records(source_id, body, "/articles")?;
    let items = records
        .into_iter()
        .filter_map(|raw| serde_json::from_value::<Article>(raw).ok())
        .filter_map(|a| {
            let title = present(a.title)?;
            let link = present(a.url)?;
            let publisher = present(a.source.and_then(|s| s.name))
                .unwrap_or_else(|| source_name.to_string());
            let summary = present(a.description)
                .or_else(|| present(a.content))
                .unwrap_or_default();
            let mut item = CanonicalItem::new(
                title,
                link,
                rfc3339_or(a.published_at.as_deref(), now),
                publisher,
            )
            .with_summary(summary);
            item.image_url = present(a.url_to_image);
            Some(item)
        })
        .collect();
    Ok(items)
}

pub struct NewsApiAdapter {
    id: String,
    name: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl NewsApiAdapter {
    pub fn new(
        id: String,
        name: String,
        url: String,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            id,
            name,
            url,
            api_key,
            client,
        }
    }
}

#[async_trait]
impl SourceAdapter for NewsApiAdapter {
    async fn fetch(&self) -> Result<Vec<CanonicalItem>, AdapterError> {
        let mut req = self.client.get(&self.url);
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }
        let body = fetch_body(&self.id, req).await?;
        parse_articles(&self.id, &self.name, &body, Utc::now())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
