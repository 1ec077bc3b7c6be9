// src/ingest/providers/social.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{fetch_body, json_records, present, rfc3339_or};
use crate::error::AdapterError;
use crate::ingest::types::{CanonicalItem, SourceAdapter};

/// Posts have no headline; the first line of the text stands in for one.
const TITLE_MAX_CHARS: usize = 140;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Post {
    id: Option<String>,
    text: Option<String>,
    created_at: Option<String>,
    permalink_url: Option<String>,
    author: Option<Author>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Author {
    name: Option<String>,
}

fn title_from_text(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.chars().count() <= TITLE_MAX_CHARS {
        return Some(line.to_string());
    }
    let mut cut: String = line.chars().take(TITLE_MAX_CHARS - 1).collect();
    cut.push('…');
    Some(cut)
}

/// `{ "data": [...] }` of posts. The author becomes part of the source label.
pub fn parse_posts(
    source_id: &str,
    source_name: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Vec<CanonicalItem>, AdapterError> {
    let records = json_records(source_id, body, "/data")?;
    let items = records
        .into_iter()
        .filter_map(|raw| serde_json::from_value::<Post>(raw).ok())
        .filter_map(|p| {
            let text = present(p.text)?;
            let title = title_from_text(&text)?;
            let link = present(p.permalink_url)?;
            let label = match present(p.author.and_then(|a| a.name)) {
                Some(author) => format!("{source_name} / {author}"),
                None => source_name.to_string(),
            };
            let mut item = CanonicalItem::new(
                title,
                link,
                rfc3339_or(p.created_at.as_deref(), now),
                label,
            )
            .with_summary(text);
            if let Some(id) = present(p.id) {
                item.id = id;
            }
            Some(item)
        })
        .collect();
    Ok(items)
}

pub struct SocialAdapter {
    id: String,
    name: String,
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SocialAdapter {
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
impl SourceAdapter for SocialAdapter {
    async fn fetch(&self) -> Result<Vec<CanonicalItem>, AdapterError> {
        let mut req = self.client.get(&self.url);
        if let Some(token) = &self.api_key {
            req = req.bearer_auth(token);
        }
        let body = fetch_body(&self.id, req).await?;
        parse_posts(&self.id, &self.name, &body, Utc::now())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
