use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::entry::{StoredEntry, StoredRecord};

/// Result of an insert attempt. A duplicate is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: bool,
    /// Row id of the new entry, or of the existing entry it collided with
    pub id: Option<i64>,
}

/// Persistent store of ranked entries.
///
/// Fingerprint, link and title are each unique. `insert_if_new` must be atomic with
/// respect to concurrent callers: two inserts of the same fingerprint yield exactly
/// one `inserted = true`.
#[async_trait::async_trait]
pub trait EntryStore: Send + Sync {
    async fn insert_if_new(&self, entry: &StoredEntry) -> Result<InsertOutcome>;

    /// Ordered by rating, then publish time, both descending.
    async fn top_by_rating(&self, limit: usize) -> Result<Vec<StoredRecord>>;

    /// Same ordering as `top_by_rating`, restricted to `published_at >= since`.
    async fn by_time_window(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<StoredRecord>>;

    async fn count(&self) -> Result<i64>;

    /// Maintenance only: removes every entry and returns how many were deleted.
    async fn purge(&self) -> Result<u64>;
}

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: i64,
    title: String,
    link: String,
    summary: String,
    source: String,
    language: String,
    published_at: DateTime<Utc>,
    published_fallback: bool,
    parsed_at: DateTime<Utc>,
    rating: f64,
    fingerprint: String,
}

impl TryFrom<EntryRow> for StoredRecord {
    type Error = anyhow::Error;

    fn try_from(row: EntryRow) -> Result<Self> {
        Ok(StoredRecord {
            id: row.id,
            entry: StoredEntry {
                title: row.title,
                link: row.link,
                summary: row.summary,
                source_name: row.source,
                language: row.language.parse()?,
                published_at: row.published_at,
                published_fallback: row.published_fallback,
                parsed_at: row.parsed_at,
                rating: row.rating,
                fingerprint: row.fingerprint,
            },
        })
    }
}

const SELECT_ENTRIES: &str = r#"
    SELECT id, title, link, summary, source, language, published_at,
           published_fallback, parsed_at, rating, fingerprint
    FROM entries
"#;

/// SQLite implementation backed by the `entries` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EntryStore for SqliteStore {
    async fn insert_if_new(&self, entry: &StoredEntry) -> Result<InsertOutcome> {
        // INSERT OR IGNORE makes the uniqueness check and the write one statement
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO entries
            (title, link, summary, source, language, published_at, published_fallback,
             parsed_at, rating, fingerprint)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&entry.summary)
        .bind(&entry.source_name)
        .bind(entry.language.as_str())
        .bind(entry.published_at)
        .bind(entry.published_fallback)
        .bind(entry.parsed_at)
        .bind(entry.rating)
        .bind(&entry.fingerprint)
        .execute(&self.pool)
        .await
        .context("failed to insert entry")?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome {
                inserted: true,
                id: Some(result.last_insert_rowid()),
            });
        }

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM entries WHERE fingerprint = ? OR link = ? OR title = ? LIMIT 1",
        )
        .bind(&entry.fingerprint)
        .bind(&entry.link)
        .bind(&entry.title)
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up existing entry")?;

        debug!(title = %entry.title, id = ?existing, "entry already stored");
        Ok(InsertOutcome {
            inserted: false,
            id: existing,
        })
    }

    async fn top_by_rating(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        let sql = format!("{SELECT_ENTRIES} ORDER BY rating DESC, published_at DESC LIMIT ?");
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch top entries")?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }

    async fn by_time_window(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "{SELECT_ENTRIES} WHERE published_at >= ? ORDER BY rating DESC, published_at DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(since)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch entries by time window")?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await
            .context("failed to count entries")
    }

    async fn purge(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM entries")
            .execute(&self.pool)
            .await
            .context("failed to purge entries")?;
        Ok(result.rows_affected())
    }
}
