use anyhow::Result;
use chrono::{Duration, Utc};
use common::SourceConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::decoder;
use crate::entry::{Entry, RankedEntry, StoredEntry};
use crate::fetcher::{Fetch, FetchError};
use crate::ranking::RankingEngine;
use crate::store::{EntryStore, InsertOutcome};

/// What one ingestion pass produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// All decoded entries, ranked descending
    pub ranked: Vec<RankedEntry>,
    /// Store outcome for each entry of `ranked`, same order
    pub inserts: Vec<InsertOutcome>,
    /// Names of sources that failed or produced nothing
    pub empty_sources: Vec<String>,
}

impl RunOutcome {
    pub fn new_count(&self) -> usize {
        self.inserts.iter().filter(|o| o.inserted).count()
    }

    pub fn top(&self, n: usize) -> Vec<RankedEntry> {
        self.ranked.iter().take(n).cloned().collect()
    }
}

/// Fetches every source concurrently, ranks the merged entries and persists them.
pub struct IngestionPipeline {
    sources: Vec<SourceConfig>,
    fetcher: Arc<dyn Fetch>,
    ranking: Arc<RankingEngine>,
    store: Arc<dyn EntryStore>,
}

impl IngestionPipeline {
    pub fn new(
        sources: Vec<SourceConfig>,
        fetcher: Arc<dyn Fetch>,
        ranking: Arc<RankingEngine>,
        store: Arc<dyn EntryStore>,
    ) -> Self {
        Self {
            sources,
            fetcher,
            ranking,
            store,
        }
    }

    /// Runs one pass over the configured sources.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        self.run_sources(&self.sources).await
    }

    /// Runs one pass over `sources`. A failing source contributes nothing; only a
    /// store failure makes the pass fail.
    pub async fn run_sources(&self, sources: &[SourceConfig]) -> Result<RunOutcome> {
        info!(sources = sources.len(), "ingestion pass starting");

        let mut handles = Vec::with_capacity(sources.len());
        for source in sources {
            let fetcher = self.fetcher.clone();
            let source = source.clone();
            handles.push(tokio::spawn(async move {
                let result = fetch_source(fetcher.as_ref(), &source).await;
                (source.name, result)
            }));
        }

        // Barrier: ranking only starts once every source has finished or failed
        let mut merged: Vec<Entry> = Vec::new();
        let mut empty_sources = Vec::new();
        for (handle, source) in handles.into_iter().zip(sources) {
            match handle.await {
                Ok((_, Ok(entries))) if !entries.is_empty() => merged.extend(entries),
                Ok((name, Ok(_))) => {
                    warn!(source = %name, "source produced no entries");
                    empty_sources.push(name);
                }
                Ok((name, Err(e))) => {
                    warn!(source = %name, error = %e, "source fetch failed");
                    empty_sources.push(name);
                }
                Err(join_err) => {
                    error!(source = %source.name, error = %join_err, "source task panicked");
                    empty_sources.push(source.name.clone());
                }
            }
        }

        let ranked = self.ranking.rank(merged, &HashMap::new());
        let parsed_at = Utc::now();

        let mut inserts = Vec::with_capacity(ranked.len());
        for item in &ranked {
            let stored = StoredEntry::from_ranked(item, parsed_at);
            inserts.push(self.store.insert_if_new(&stored).await?);
        }

        let outcome = RunOutcome {
            ranked,
            inserts,
            empty_sources,
        };
        info!(
            total = outcome.ranked.len(),
            new = outcome.new_count(),
            failed_sources = outcome.empty_sources.len(),
            "ingestion pass finished"
        );
        Ok(outcome)
    }

    /// Stored entries published within the last `hours`, best first. When the window
    /// holds nothing, runs a fresh pass and returns its top entries instead.
    pub async fn digest(&self, hours: u64, limit: usize) -> Result<Vec<RankedEntry>> {
        let since = Utc::now() - Duration::hours(hours as i64);
        let stored = self.store.by_time_window(since, limit).await?;
        if !stored.is_empty() {
            return Ok(stored.into_iter().map(RankedEntry::from).collect());
        }

        info!(hours, "no stored entries in window, running ingestion");
        let outcome = self.run_once().await?;
        Ok(outcome.top(limit))
    }
}

async fn fetch_source(fetcher: &dyn Fetch, source: &SourceConfig) -> Result<Vec<Entry>, FetchError> {
    info!(source = %source.name, url = %source.url, "fetching source");
    let bytes = fetcher.fetch(&source.url).await?;
    Ok(decoder::decode(&bytes, source, Utc::now()))
}
