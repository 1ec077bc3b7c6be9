// src/ingest/providers/fixture.rs
//! Serves items from a local JSON file. Used for local runs and tests.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{json_records, present, rfc3339_or};
use crate::error::AdapterError;
use crate::ingest::types::{CanonicalItem, SourceAdapter};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Record {
    id: Option<String>,
    title: Option<String>,
    link: Option<String>,
    published_at: Option<String>,
    summary: Option<String>,
    source_name: Option<String>,
    category: Option<String>,
    image_url: Option<String>,
    topics: Vec<String>,
}

/// Top-level JSON array of canonical-shaped records.
pub fn parse_items(
    source_id: &str,
    source_name: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Vec<CanonicalItem>, AdapterError> {
    let records = json_records(source_id, body, "")?;
    let items = records
        .into_iter()
        .filter_map(|raw| serde_json::from_value::<Record>(raw).ok())
        .filter_map(|r| {
            let title = present(r.title)?;
            let link = present(r.link)?;
            let mut item = CanonicalItem::new(
                title,
                link,
                rfc3339_or(r.published_at.as_deref(), now),
                present(r.source_name).unwrap_or_else(|| source_name.to_string()),
            )
            .with_summary(r.summary.unwrap_or_default());
            if let Some(id) = present(r.id) {
                item.id = id;
            }
            item.category = present(r.category);
            item.image_url = present(r.image_url);
            item.topics = r.topics.into_iter().collect();
            Some(item)
        })
        .collect();
    Ok(items)
}

pub struct FixtureAdapter {
    id: String,
    name: String,
    path: PathBuf,
}

impl FixtureAdapter {
    pub fn new(id: String, name: String, path: PathBuf) -> Self {
        Self { id, name, path }
    }
}

#[async_trait]
impl SourceAdapter for FixtureAdapter {
    async fn fetch(&self) -> Result<Vec<CanonicalItem>, AdapterError> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AdapterError::new(&self.id, e))?;
        parse_items(&self.id, &self.name, &body, Utc::now())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
