use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use common::{RankingConfig, RankingWeights, SourceConfig};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::entry::{Entry, RankedEntry};

/// Matches at or above this count saturate the keyword term.
const KEYWORD_SATURATION: f64 = 5.0;

/// Composite relevance scoring: freshness, source weight, keyword density and
/// article length, combined with the configured weights and scaled to the rating range.
pub struct RankingEngine {
    weights: RankingWeights,
    rating_min: f64,
    rating_max: f64,
    default_source_weight: f64,
    source_weights: HashMap<String, f64>,
    keywords: Vec<Regex>,
}

impl RankingEngine {
    pub fn new(config: &RankingConfig, sources: &[SourceConfig]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut keywords = Vec::with_capacity(config.keywords.len());
        for kw in &config.keywords {
            let kw = kw.trim().to_lowercase();
            if kw.is_empty() || !seen.insert(kw.clone()) {
                continue;
            }
            let pattern = keyword_pattern(&kw);
            keywords.push(
                Regex::new(&pattern).with_context(|| format!("invalid keyword pattern for '{}'", kw))?,
            );
        }

        let source_weights = sources.iter().map(|s| (s.name.clone(), s.weight)).collect();

        info!(keywords = keywords.len(), sources = sources.len(), "ranking engine ready");
        Ok(Self {
            weights: config.weights,
            rating_min: config.rating_min,
            rating_max: config.rating_max,
            default_source_weight: config.default_source_weight,
            source_weights,
            keywords,
        })
    }

    /// Scores against the current time.
    pub fn score(&self, entry: &Entry, content_length: Option<usize>) -> f64 {
        self.score_at(entry, content_length, Utc::now())
    }

    /// Rating in [rating_min, rating_max], rounded to two decimals.
    pub fn score_at(&self, entry: &Entry, content_length: Option<usize>, now: DateTime<Utc>) -> f64 {
        let freshness = freshness_score(entry.published_at.naive_utc(), now.naive_utc());
        let source = self.source_score(&entry.source_name);
        let keywords = self.keyword_score(&entry.title, &entry.summary);
        let length = length_score(content_length.unwrap_or(0));

        let w = &self.weights;
        let total = freshness * w.freshness + source * w.source + keywords * w.keywords + length * w.length;
        let rating = (total * self.rating_max).clamp(self.rating_min, self.rating_max);
        let rating = (rating * 100.0).round() / 100.0;

        debug!(
            title = %entry.title,
            rating,
            freshness,
            source,
            keywords,
            length,
            "scored entry"
        );
        rating
    }

    /// `source_weight / 10`, with unlisted sources at the configured default weight.
    pub fn source_score(&self, source_name: &str) -> f64 {
        let weight = self
            .source_weights
            .get(source_name)
            .copied()
            .unwrap_or(self.default_source_weight);
        weight / 10.0
    }

    /// `min(1, matches / 5)` over whole-word, case-insensitive vocabulary hits.
    pub fn keyword_score(&self, title: &str, summary: &str) -> f64 {
        let text = format!("{} {}", title, summary);
        let count: usize = self.keywords.iter().map(|re| re.find_iter(&text).count()).sum();
        (count as f64 / KEYWORD_SATURATION).min(1.0)
    }

    /// Scores and sorts descending. Equal ratings keep their input order.
    pub fn rank(&self, entries: Vec<Entry>, content_lengths: &HashMap<String, usize>) -> Vec<RankedEntry> {
        self.rank_at(entries, content_lengths, Utc::now())
    }

    pub fn rank_at(
        &self,
        entries: Vec<Entry>,
        content_lengths: &HashMap<String, usize>,
        now: DateTime<Utc>,
    ) -> Vec<RankedEntry> {
        let mut ranked: Vec<RankedEntry> = entries
            .into_iter()
            .map(|entry| {
                let length = content_lengths.get(&entry.link).copied();
                let rating = self.score_at(&entry, length, now);
                RankedEntry { entry, rating }
            })
            .collect();

        ranked.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        info!(count = ranked.len(), "ranked entries");
        ranked
    }
}

/// Case-insensitive whole-word pattern. Word boundaries are only anchored on ends that
/// are word characters, so "c++" and "c#" still match before whitespace.
fn keyword_pattern(keyword: &str) -> String {
    let is_word = |c: Option<char>| c.map_or(false, |c| c.is_alphanumeric() || c == '_');
    let start = if is_word(keyword.chars().next()) { r"\b" } else { "" };
    let end = if is_word(keyword.chars().last()) { r"\b" } else { "" };
    format!("(?i){}{}{}", start, regex::escape(keyword), end)
}

/// Step function of age. Both sides are offset-free.
pub fn freshness_score(published_at: NaiveDateTime, now: NaiveDateTime) -> f64 {
    let age = now - published_at;
    if age < Duration::hours(1) {
        1.0
    } else if age < Duration::hours(3) {
        0.9
    } else if age < Duration::hours(6) {
        0.7
    } else if age < Duration::hours(12) {
        0.5
    } else if age < Duration::days(1) {
        0.3
    } else {
        0.1
    }
}

/// Word count of the full article; 0 means unknown and scores neutral.
pub fn length_score(words: usize) -> f64 {
    match words {
        0 => 0.5,
        500..=2000 => 1.0,
        300..=499 | 2001..=3000 => 0.8,
        100..=299 => 0.5,
        _ => 0.3,
    }
}
