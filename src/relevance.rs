// src/relevance.rs
//! Relevance scoring: exponential recency decay times a keyword boost.
//!
//! `score = 0.5^(max(age_h, 1) / half_life_h) * (1 + sum(boosts matching topics))`,
//! rounded to 3 decimals. Pure and deterministic for a given `now`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ingest::types::CanonicalItem;

pub const DEFAULT_HALF_LIFE_HOURS: f64 = 6.0;
/// Ages below this are floored (fresh or future-dated items).
const MIN_AGE_HOURS: f64 = 1.0;

fn default_half_life_hours() -> f64 {
    DEFAULT_HALF_LIFE_HOURS
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,
    /// keyword → boost weight; keywords are matched case-insensitively against topics.
    #[serde(default)]
    pub keyword_boosts: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            half_life_hours: DEFAULT_HALF_LIFE_HOURS,
            keyword_boosts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    half_life_hours: f64,
    boosts: Vec<(String, f64)>,
}

impl RelevanceScorer {
    pub fn new(cfg: &ScoringConfig) -> Self {
        let boosts = cfg
            .keyword_boosts
            .iter()
            .map(|(k, w)| (k.trim().to_lowercase(), *w))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self {
            half_life_hours: if cfg.half_life_hours > 0.0 {
                cfg.half_life_hours
            } else {
                DEFAULT_HALF_LIFE_HOURS
            },
            boosts,
        }
    }

    /// `0.5^(age / half_life)` with age floored at one hour.
    pub fn recency(&self, published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - published_at).num_milliseconds() as f64 / 3_600_000.0;
        0.5f64.powf(age_hours.max(MIN_AGE_HOURS) / self.half_life_hours)
    }

    /// Sum of boosts whose keyword is one of the item's topics.
    pub fn keyword_sum(&self, item: &CanonicalItem) -> f64 {
        self.boosts
            .iter()
            .filter(|(k, _)| item.topics.contains(k))
            .map(|(_, w)| *w)
            .sum()
    }

    pub fn score(&self, item: &CanonicalItem, now: DateTime<Utc>) -> f64 {
        round3(self.recency(item.published_at, now) * (1.0 + self.keyword_sum(item)))
    }

    /// Fill `relevance_score` on every item.
    pub fn score_all(&self, items: &mut [CanonicalItem], now: DateTime<Utc>) {
        for item in items.iter_mut() {
            item.relevance_score = Some(self.score(item, now));
        }
    }
}

fn round3(x: f64) -> f64 {
    (x * 1_000.0).round() / 1_000.0
}

/// Descending by score, ties broken by newer `published_at` first.
pub fn rank(items: &mut [CanonicalItem]) {
    items.sort_by(|a, b| {
        let sa = a.relevance_score.unwrap_or(0.0);
        let sb = b.relevance_score.unwrap_or(0.0);
        sb.total_cmp(&sa)
            .then_with(|| b.published_at.cmp(&a.published_at))
            .then(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
    }

    fn scorer(boosts: &[(&str, f64)]) -> RelevanceScorer {
        RelevanceScorer::new(&ScoringConfig {
            half_life_hours: 6.0,
            keyword_boosts: boosts.iter().map(|(k, w)| (k.to_string(), *w)).collect(),
        })
    }

    fn item_aged(hours: i64, topics: &[&str]) -> CanonicalItem {
        let mut it = CanonicalItem::new("t", "http://x/1", now() - Duration::hours(hours), "S");
        it.topics = topics.iter().map(|t| t.to_string()).collect();
        it
    }

    #[test]
    fn one_half_life_is_one_half() {
        let s = scorer(&[]);
        let it = item_aged(6, &[]);
        assert!((s.recency(it.published_at, now()) - 0.5).abs() < 1e-12);
        assert_eq!(s.score(&it, now()), 0.5);
    }

    #[test]
    fn two_boosted_keywords_add_up() {
        let s = scorer(&[("poll", 1.5), ("rally", 1.25), ("unused", 9.0)]);
        let it = item_aged(6, &["poll", "rally", "ohio"]);
        assert!((s.keyword_sum(&it) - 2.75).abs() < 1e-12);
        assert_eq!(s.score(&it, now()), 1.875);
    }

    #[test]
    fn boost_keywords_are_case_insensitive() {
        let s = scorer(&[("Poll", 1.0)]);
        let it = item_aged(6, &["poll"]);
        assert_eq!(s.score(&it, now()), 1.0);
    }

    #[test]
    fn age_is_floored_at_one_hour() {
        let s = scorer(&[]);
        let fresh = item_aged(0, &[]);
        let future = item_aged(-5, &[]);
        let expected = round3(0.5f64.powf(1.0 / 6.0));
        assert_eq!(s.score(&fresh, now()), expected);
        assert_eq!(s.score(&future, now()), expected);
        assert_eq!(expected, 0.891);
    }

    #[test]
    fn rank_orders_by_score_then_recency() {
        let s = scorer(&[("poll", 1.0)]);
        let mut items = vec![
            item_aged(12, &[]),
            item_aged(12, &["poll"]),
            item_aged(0, &[]),
        ];
        // Same score, different timestamps (both floored to 1h).
        let mut tie = item_aged(0, &[]);
        tie.published_at = now() - Duration::minutes(30);
        items.push(tie);

        s.score_all(&mut items, now());
        rank(&mut items);

        let scores: Vec<f64> = items.iter().map(|i| i.relevance_score.unwrap()).collect();
        assert_eq!(scores, vec![0.891, 0.891, 0.5, 0.25]);
        assert_eq!(items[0].published_at, now());
        assert_eq!(items[1].published_at, now() - Duration::minutes(30));
    }
}
