// src/ingest/mod.rs
pub mod dedup;
pub mod providers;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod types;

use std::collections::BTreeSet;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;

use crate::ingest::types::CanonicalItem;

pub const DEFAULT_TOPIC_LIMIT: usize = 8;
const SUMMARY_MAX_CHARS: usize = 1_500;
pub const GENERAL_CATEGORY: &str = "general";

/// Fixed category taxonomy, checked in order. Keywords match whole words (or
/// whole word runs for phrases); a trailing `*` marks a stem that matches any
/// word starting with it.
const TAXONOMY: &[(&str, &[&str])] = &[
    (
        "polling",
        &[
            "poll", "polls", "polled", "polling", "pollster", "pollsters", "survey", "surveys",
            "approval rating", "approval ratings", "margin of error", "ballot", "ballots",
        ],
    ),
    (
        "events",
        &[
            "rally", "rallies", "town hall", "town halls", "debate", "debates", "event", "events",
            "rsvp", "meet and greet", "forum", "forums",
        ],
    ),
    (
        "fundraising",
        &[
            "fundrais*", "donation", "donations", "donor", "donors", "raised", "super pac",
            "war chest", "fec filing",
        ],
    ),
    ("endorsements", &["endors*", "backs", "backed", "backing"]),
];

fn default_topic_limit() -> usize {
    DEFAULT_TOPIC_LIMIT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NormalizeSettings {
    /// Max number of distinct topics derived per item.
    #[serde(default = "default_topic_limit")]
    pub topic_limit: usize,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            topic_limit: DEFAULT_TOPIC_LIMIT,
        }
    }
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?[a-z!][^>]*>").expect("tag regex"))
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

fn re_word() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?u)\b\w+\b").expect("tokenizer regex"))
}

/// Normalize typographic quotes and collapse whitespace. No entity decoding.
fn tidy(s: &str) -> String {
    let quoted = s
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    re_ws().replace_all(&quoted, " ").trim().to_string()
}

/// Decode HTML entities, normalize typographic quotes, collapse whitespace.
pub fn clean_title(s: &str) -> String {
    tidy(&html_escape::decode_html_entities(s))
}

/// Like [`clean_title`], but also strips markup and caps the length.
///
/// Entities are decoded exactly once, before stripping, so entity-encoded
/// markup (`&lt;p&gt;`) is removed while double-escaped text stays text.
pub fn clean_summary(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags().replace_all(&decoded, " ");
    let mut out = tidy(&stripped);
    if out.chars().count() > SUMMARY_MAX_CHARS {
        out = out.chars().take(SUMMARY_MAX_CHARS).collect();
    }
    out
}

/// Lowercased word tokens, in order of appearance.
pub fn tokenize(input: &str) -> Vec<String> {
    re_word()
        .find_iter(input)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// First `limit` distinct tokens longer than 3 characters.
pub fn extract_topics(text: &str, limit: usize) -> BTreeSet<String> {
    first_long_tokens(text, limit).into_iter().collect()
}

fn first_long_tokens(text: &str, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if out.len() >= limit {
            break;
        }
        if token.chars().count() > 3 && !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

/// Keyword match against the fixed taxonomy, else [`GENERAL_CATEGORY`].
pub fn infer_category(text: &str) -> &'static str {
    let joined = format!(" {} ", tokenize(text).join(" "));
    for (category, keywords) in TAXONOMY {
        let hit = keywords.iter().any(|k| match k.strip_suffix('*') {
            Some(stem) => joined.contains(&format!(" {stem}")),
            None => joined.contains(&format!(" {k} ")),
        });
        if hit {
            return *category;
        }
    }
    GENERAL_CATEGORY
}

/// Clean and enrich canonical items, dropping any without an id, title or link.
///
/// Pure: output depends only on the input and `settings`.
pub fn normalize(items: Vec<CanonicalItem>, settings: &NormalizeSettings) -> Vec<CanonicalItem> {
    let mut out = Vec::with_capacity(items.len());
    for mut item in items {
        item.id = item.id.trim().to_string();
        item.link = item.link.trim().to_string();
        item.title = clean_title(&item.title);
        item.summary = clean_summary(&item.summary);
        item.source_name = item.source_name.trim().to_string();

        if item.id.is_empty() || item.title.is_empty() || item.link.is_empty() {
            continue;
        }

        let text = format!("{} {}", item.title, item.summary);

        let mut topics: BTreeSet<String> = item
            .topics
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .take(settings.topic_limit)
            .collect();
        // Upstream topics count toward the limit first.
        for token in first_long_tokens(&text, settings.topic_limit) {
            if topics.len() >= settings.topic_limit {
                break;
            }
            topics.insert(token);
        }
        item.topics = topics;

        item.category = match item.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => Some(c.to_string()),
            _ => Some(infer_category(&text).to_string()),
        };
        item.image_url = item
            .image_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        out.push(item);
    }
    out
}
