// src/ingest/dedup.rs
//! Cross-source deduplication.
//!
//! Items are keyed by their normalized link (fragment and tracking parameters
//! removed, remaining query parameters sorted). Within a key, a content hash
//! over `(title, link, published_at)` decides what happens to a later item:
//! identical content is dropped, changed content replaces the earlier item in
//! its original position. The last-seen changed version wins, not the most
//! recent timestamp, so the result depends on arrival order.
//!
//! The hash covers the normalized link, not the raw one. Copies that differ
//! only in tracking parameters are therefore identical content: the later
//! copy is dropped and the first keeps its original link.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use url::Url;

use crate::ingest::types::CanonicalItem;

/// Query parameters that only track the click and never change the content.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "ref_src",
];

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "utm" || name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

/// Canonical form of a link used as the dedup key.
pub fn dedup_key(link: &str) -> String {
    let link = link.trim();
    let Ok(mut url) = Url::parse(link) else {
        // Not an absolute URL: best effort, drop the fragment only.
        return link.split('#').next().unwrap_or(link).to_string();
    };

    url.set_fragment(None);
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }
    url.to_string()
}

fn content_hash(item: &CanonicalItem, key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(item.title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(key.as_bytes());
    hasher.update([0x1f]);
    hasher.update(item.published_at.timestamp_millis().to_be_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    /// Later items with identical content, dropped.
    pub dropped: usize,
    /// Later items with changed content that replaced an earlier one.
    pub replaced: usize,
}

/// Deduplicate in arrival order. See the module docs for the rules.
pub fn dedupe(items: Vec<CanonicalItem>) -> Vec<CanonicalItem> {
    dedupe_with_stats(items).0
}

pub fn dedupe_with_stats(items: Vec<CanonicalItem>) -> (Vec<CanonicalItem>, DedupStats) {
    let mut kept: Vec<CanonicalItem> = Vec::with_capacity(items.len());
    let mut seen: HashMap<String, (usize, [u8; 32])> = HashMap::new();
    let mut stats = DedupStats::default();

    for item in items {
        let key = dedup_key(&item.link);
        let hash = content_hash(&item, &key);
        match seen.get_mut(&key) {
            Some((_, prev)) if *prev == hash => stats.dropped += 1,
            Some((pos, prev)) => {
                *prev = hash;
                kept[*pos] = item;
                stats.replaced += 1;
            }
            None => {
                seen.insert(key, (kept.len(), hash));
                kept.push(item);
            }
        }
    }

    (kept, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn at(h: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, 0, 0).unwrap()
    }

    #[test]
    fn key_strips_fragment_and_tracking_and_sorts_query() {
        assert_eq!(dedup_key("http://x/1?utm=abc"), "http://x/1");
        assert_eq!(dedup_key("http://x/1#comments"), "http://x/1");
        assert_eq!(
            dedup_key("https://News.example.com/a?b=2&utm_source=tw&a=1"),
            "https://news.example.com/a?a=1&b=2"
        );
        assert_eq!(dedup_key("https://e.com/a?b=2&a=1"), dedup_key("https://e.com/a?a=1&b=2"));
    }

    #[test]
    fn key_tolerates_relative_links() {
        assert_eq!(dedup_key("/story/9#top"), "/story/9");
    }

    #[test]
    fn identical_content_keeps_exactly_one() {
        let a = CanonicalItem::new("Foo", "http://x/1", at(9), "A");
        let b = CanonicalItem::new("Foo", "http://x/1", at(9), "B");
        let (out, stats) = dedupe_with_stats(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_name, "A");
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn changed_title_later_in_stream_wins() {
        let first = CanonicalItem::new("Foo", "http://x/1", at(9), "A");
        let amended = CanonicalItem::new("Foo (updated)", "http://x/1", at(9), "A");
        let (out, stats) = dedupe_with_stats(vec![first, amended]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Foo (updated)");
        assert_eq!(stats.replaced, 1);
    }

    #[test]
    fn last_seen_wins_even_when_older() {
        // Order-dependent by design: the later arrival wins over a newer timestamp.
        let newer = CanonicalItem::new("Foo v2", "http://x/1", at(10), "A");
        let older = CanonicalItem::new("Foo v1", "http://x/1", at(8), "B");
        let out = dedupe(vec![newer.clone(), older.clone()]);
        assert_eq!(out, vec![older.clone()]);

        let out = dedupe(vec![older, newer.clone()]);
        assert_eq!(out, vec![newer]);
    }

    #[test]
    fn replacement_keeps_first_arrival_position() {
        let a = CanonicalItem::new("A", "http://x/a", at(9), "S");
        let b = CanonicalItem::new("B", "http://x/b", at(9), "S");
        let a2 = CanonicalItem::new("A2", "http://x/a#x", at(9) + Duration::minutes(5), "S");
        let out = dedupe(vec![a, b, a2]);
        let titles: Vec<_> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A2", "B"]);
    }

    #[test]
    fn tracking_param_variant_across_sources_collapses() {
        let a = CanonicalItem::new("Foo", "http://x/1", at(9), "A");
        let b = CanonicalItem::new("Foo", "http://x/1?utm=abc", at(9), "B");
        let out = dedupe(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].link, "http://x/1");
    }
}
