use chrono::{DateTime, Utc};
use common::Language;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An article as decoded from a feed, before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub title: String,
    pub link: String,
    /// Plain text; markup is stripped by the decoder
    pub summary: String,
    pub source_name: String,
    pub language: Language,
    pub published_at: DateTime<Utc>,
    /// True when no timestamp field could be parsed and `published_at` is the ingestion time
    pub published_fallback: bool,
}

impl Entry {
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.title, &self.link, &self.summary)
    }
}

/// Entry plus its computed rating in [0, 10].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    #[serde(flatten)]
    pub entry: Entry,
    pub rating: f64,
}

/// Persisted form of a ranked entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source_name: String,
    pub language: Language,
    pub published_at: DateTime<Utc>,
    pub published_fallback: bool,
    pub parsed_at: DateTime<Utc>,
    pub rating: f64,
    pub fingerprint: String,
}

impl StoredEntry {
    pub fn from_ranked(ranked: &RankedEntry, parsed_at: DateTime<Utc>) -> Self {
        let e = &ranked.entry;
        Self {
            title: e.title.clone(),
            link: e.link.clone(),
            summary: e.summary.clone(),
            source_name: e.source_name.clone(),
            language: e.language,
            published_at: e.published_at,
            published_fallback: e.published_fallback,
            parsed_at,
            rating: ranked.rating,
            fingerprint: e.fingerprint(),
        }
    }
}

/// A stored entry together with the identity the store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub entry: StoredEntry,
}

impl From<StoredRecord> for RankedEntry {
    fn from(record: StoredRecord) -> Self {
        let s = record.entry;
        RankedEntry {
            entry: Entry {
                title: s.title,
                link: s.link,
                summary: s.summary,
                source_name: s.source_name,
                language: s.language,
                published_at: s.published_at,
                published_fallback: s.published_fallback,
            },
            rating: s.rating,
        }
    }
}

/// SHA-256 over title, link and summary (hex). Source metadata never takes part.
pub fn fingerprint(title: &str, link: &str, summary: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0x1fu8]);
    hasher.update(link.as_bytes());
    hasher.update([0x1fu8]);
    hasher.update(summary.as_bytes());
    format!("{:x}", hasher.finalize())
}
