// src/ingest/providers/rss.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::{fetch_body, present};
use crate::error::AdapterError;
use crate::ingest::types::{id_from_link, CanonicalItem, SourceAdapter};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<Text>,
    enclosure: Option<Enclosure>,
}

/// Element whose attributes we ignore (`<guid isPermaLink=..>`, `<category domain=..>`).
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// HTML entities that are not legal XML but show up in real feeds.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
        .replace("&hellip;", "&#8230;")
}

/// Parse an RSS 2.0 document. A document without `<channel>` is malformed;
/// items without a title or link are skipped.
pub fn parse_feed(
    source_id: &str,
    source_name: &str,
    xml: &str,
    now: DateTime<Utc>,
) -> Result<Vec<CanonicalItem>, AdapterError> {
    let rss: Rss = from_str(&scrub_html_entities_for_xml(xml))
        .map_err(|e| AdapterError::malformed(source_id, format!("invalid RSS: {e}")))?;

    let mut out = Vec::with_capacity(rss.channel.items.len());
    for it in rss.channel.items {
        let (Some(title), Some(link)) = (present(it.title), present(it.link)) else {
            continue;
        };
        let id = present(it.guid.map(|g| g.value)).unwrap_or_else(|| id_from_link(&link));
        let published_at = it
            .pub_date
            .as_deref()
            .and_then(parse_rfc2822)
            .unwrap_or(now);

        let mut item = CanonicalItem::new(title, link, published_at, source_name)
            .with_id(id)
            .with_summary(it.description.unwrap_or_default());
        item.category = it
            .categories
            .into_iter()
            .find_map(|c| present(Some(c.value)));
        item.image_url = present(it.enclosure.and_then(|e| e.url));
        out.push(item);
    }
    Ok(out)
}

/// RSS 2.0 over HTTP.
pub struct RssAdapter {
    id: String,
    name: String,
    url: String,
    client: reqwest::Client,
}

impl RssAdapter {
    pub fn new(id: String, name: String, url: String, client: reqwest::Client) -> Self {
        Self {
            id,
            name,
            url,
            client,
        }
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    async fn fetch(&self) -> Result<Vec<CanonicalItem>, AdapterError> {
        let body = fetch_body(&self.id, self.client.get(&self.url)).await?;
        parse_feed(&self.id, &self.name, &body, Utc::now())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
