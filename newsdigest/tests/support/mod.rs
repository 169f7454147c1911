#![allow(dead_code)]

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use common::{Language, SourceConfig};
use newsdigest::delivery::Deliver;
use newsdigest::entry::{RankedEntry, StoredEntry, StoredRecord};
use newsdigest::fetcher::{Fetch, FetchError};
use newsdigest::store::{EntryStore, InsertOutcome};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn source(name: &str, url: &str, weight: f64) -> SourceConfig {
    SourceConfig {
        name: name.into(),
        url: url.into(),
        language: Language::En,
        weight,
    }
}

/// Minimal RSS 2.0 document with one `<item>` per (title, link, pub_date).
pub fn rss(items: &[(&str, &str, DateTime<Utc>)]) -> Vec<u8> {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Test feed</title><link>https://example.com</link><description>fixture</description>"#,
    );
    for (title, link, published) in items {
        body.push_str(&format!(
            "<item><title>{}</title><link>{}</link><description>Fixture item</description><pubDate>{}</pubDate></item>",
            title,
            link,
            published.to_rfc2822()
        ));
    }
    body.push_str("</channel></rss>");
    body.into_bytes()
}

/// Single-connection in-memory database with migrations applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    common::run_migrations(&pool).await.expect("run migrations");
    pool
}

/// Serves canned responses per URL and counts calls.
#[derive(Default)]
pub struct StubFetcher {
    responses: Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, response: Result<Vec<u8>, FetchError>) -> Self {
        self.set(url, response);
        self
    }

    pub fn set(&self, url: &str, response: Result<Vec<u8>, FetchError>) {
        self.responses.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetch for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::HttpStatus(404)))
    }
}

/// In-memory store with the same uniqueness rules as the sqlite table.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(())
    }

    fn sorted(&self, filter: impl Fn(&StoredRecord) -> bool, limit: usize) -> Vec<StoredRecord> {
        let mut rows: Vec<StoredRecord> = self.rows.lock().unwrap().iter().filter(|r| filter(r)).cloned().collect();
        rows.sort_by(|a, b| {
            b.entry
                .rating
                .total_cmp(&a.entry.rating)
                .then(b.entry.published_at.cmp(&a.entry.published_at))
        });
        rows.truncate(limit);
        rows
    }
}

#[async_trait::async_trait]
impl EntryStore for MemoryStore {
    async fn insert_if_new(&self, entry: &StoredEntry) -> Result<InsertOutcome> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.iter().find(|r| {
            r.entry.fingerprint == entry.fingerprint || r.entry.link == entry.link || r.entry.title == entry.title
        }) {
            return Ok(InsertOutcome {
                inserted: false,
                id: Some(existing.id),
            });
        }
        let id = rows.len() as i64 + 1;
        rows.push(StoredRecord {
            id,
            entry: entry.clone(),
        });
        Ok(InsertOutcome {
            inserted: true,
            id: Some(id),
        })
    }

    async fn top_by_rating(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        self.check()?;
        Ok(self.sorted(|_| true, limit))
    }

    async fn by_time_window(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<StoredRecord>> {
        self.check()?;
        Ok(self.sorted(|r| r.entry.published_at >= since, limit))
    }

    async fn count(&self) -> Result<i64> {
        self.check()?;
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn purge(&self) -> Result<u64> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let n = rows.len() as u64;
        rows.clear();
        Ok(n)
    }
}

/// Records every digest it receives and answers with a fixed result.
pub struct RecordingDelivery {
    succeed: bool,
    pub received: Mutex<Vec<(String, Vec<RankedEntry>)>>,
}

impl RecordingDelivery {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Deliver for RecordingDelivery {
    async fn deliver(&self, entries: &[RankedEntry], period: &str) -> bool {
        self.received
            .lock()
            .unwrap()
            .push((period.to_string(), entries.to_vec()));
        self.succeed
    }
}
