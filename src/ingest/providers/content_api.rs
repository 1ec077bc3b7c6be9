// src/ingest/providers/content_api.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{fetch_body, json_records, present, rfc3339_or};
use crate::error::AdapterError;
use crate::ingest::types::{CanonicalItem, SourceAdapter};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContentResult {
    id: Option<String>,
    web_title: Option<String>,
    web_url: Option<String>,
    web_publication_date: Option<String>,
    section_name: Option<String>,
    fields: Option<Fields>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Fields {
    trail_text: Option<String>,
    thumbnail: Option<String>,
}

/// Licensed content API: `{ "response": { "results": [...] } }`.
pub fn parse_results(
    source_id: &str,
    source_name: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Vec<CanonicalItem>, AdapterError> {
    let records = json_records(source_id, body, "/response/results")?;
    let items = records
        .into_iter()
        .filter_map(|raw| serde_json::from_value::<ContentResult>(raw).ok())
        .filter_map(|r| {
            let title = present(r.web_title)?;
            let link = present(r.web_url)?;
            let fields = r.fields.unwrap_or_default();
            let mut item = CanonicalItem::new(
                title,
                link,
                rfc3339_or(r.web_publication_date.as_deref(), now),
                source_name,
            )
            .with_summary(fields.trail_text.unwrap_or_default());
            if let Some(id) = present(r.id) {
                item.id = id;
            }
            item.category = present(r.section_name);
            item.image_url = present(fields.thumbnail);
            Some(item)
        })
        .collect();
    Ok(items)
}

pub struct ContentApiAdapter {
    id: String,
    name: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ContentApiAdapter {
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
impl SourceAdapter for ContentApiAdapter {
    async fn fetch(&self) -> Result<Vec<CanonicalItem>, AdapterError> {
        let mut req = self
            .client
            .get(&self.url)
            .query(&[("show-fields", "trailText,thumbnail")]);
        if let Some(key) = &self.api_key {
            req = req.query(&[("api-key", key.as_str())]);
        }
        let body = fetch_body(&self.id, req).await?;
        parse_results(&self.id, &self.name, &body, Utc::now())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
