/*
newsdigest - main.rs
Loads configuration, opens the store and either runs the digest scheduler or a
single maintenance command.
*/

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::{init_db_pool, run_migrations, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use newsdigest::delivery::{self, period_label_for_hours, Deliver};
use newsdigest::entry::RankedEntry;
use newsdigest::fetcher::HttpFetcher;
use newsdigest::pipeline::IngestionPipeline;
use newsdigest::ranking::RankingEngine;
use newsdigest::scheduler::Scheduler;
use newsdigest::store::{EntryStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "newsdigest", about = "Feed ingestion, ranking and scheduled digests")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until Ctrl-C (default)
    Run,
    /// Run a single ingestion cycle and print the top entries
    Once {
        /// Also hand the top entries to the configured delivery sink
        #[arg(long)]
        deliver: bool,
    },
    /// Print the best stored entries
    Top {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Build a digest from entries published in the last HOURS
    Digest {
        #[arg(long, default_value_t = 24)]
        hours: u64,
        #[arg(long)]
        deliver: bool,
    },
    /// Delete every stored entry
    Purge {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config).await?;

    let db_path = config.database.path.clone();
    let pool = match init_db_pool(&db_path).await {
        Ok(p) => p,
        Err(e) => {
            error!(%e, db_path = %db_path, "failed to initialize database pool");
            return Err(e);
        }
    };
    run_migrations(&pool).await?;
    info!(db_path = %db_path, "database ready");

    let store: Arc<dyn EntryStore> = Arc::new(SqliteStore::new(pool));
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let ranking = Arc::new(RankingEngine::new(&config.ranking, &config.sources)?);
    let pipeline = Arc::new(IngestionPipeline::new(
        config.sources.clone(),
        fetcher,
        ranking,
        store.clone(),
    ));
    let sink = delivery::from_config(&config.delivery)?;
    let top_n = config.scheduler.top_n;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let mode = config.scheduler.schedule_mode()?;
            let scheduler = Arc::new(Scheduler::new(mode, pipeline, sink, top_n));
            run_scheduler(scheduler).await;
        }
        Command::Once { deliver } => {
            let outcome = pipeline.run_once().await?;
            println!(
                "{} entries ranked, {} new, {} sources empty",
                outcome.ranked.len(),
                outcome.new_count(),
                outcome.empty_sources.len()
            );
            let top = outcome.top(top_n);
            print_entries(&top);
            if deliver {
                let period = newsdigest::scheduler::period_label(&config.scheduler.schedule_mode()?);
                report_delivery(sink.as_ref(), &top, &period).await;
            }
        }
        Command::Top { limit } => {
            let records = store.top_by_rating(limit.unwrap_or(top_n)).await?;
            let top: Vec<RankedEntry> = records.into_iter().map(RankedEntry::from).collect();
            print_entries(&top);
        }
        Command::Digest { hours, deliver } => {
            let top = pipeline.digest(hours, top_n).await?;
            let period = period_label_for_hours(hours);
            println!("Digest for {}:", period);
            print_entries(&top);
            if deliver {
                report_delivery(sink.as_ref(), &top, &period).await;
            }
        }
        Command::Purge { yes } => {
            if !yes {
                bail!("refusing to purge without --yes");
            }
            let before = store.count().await?;
            let removed = store.purge().await?;
            info!(before, removed, "store purged");
            println!("Removed {} entries", removed);
        }
    }

    Ok(())
}

async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            bail!("Config file not found: {}", p.display());
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(default_path.as_path()) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default_file = ?default_path, override_file = ?override_path, sources = config.sources.len(), "configuration loaded");
    Ok(config)
}

/// Runs the scheduler until it exits on its own or Ctrl-C arrives.
async fn run_scheduler(scheduler: Arc<Scheduler>) {
    let task = scheduler.clone();
    let mut handle = tokio::spawn(async move { task.start().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, stopping scheduler");
            scheduler.stop();
            // The loop only notices the flag between phases; give an in-flight cycle a grace period
            match tokio::time::timeout(Duration::from_secs(20), &mut handle).await {
                Ok(Ok(())) => info!("scheduler exited cleanly"),
                Ok(Err(join_err)) => error!(%join_err, "scheduler task panicked"),
                Err(_) => {
                    info!("timed out waiting for scheduler; aborting");
                    handle.abort();
                }
            }
        }
        res = &mut handle => {
            if let Err(join_err) = res {
                error!(%join_err, "scheduler task panicked");
            }
        }
    }

    info!("Shutdown complete");
}

async fn report_delivery(sink: &dyn Deliver, entries: &[RankedEntry], period: &str) {
    if sink.deliver(entries, period).await {
        println!("Delivered {} entries ({})", entries.len(), period);
    } else {
        println!("Delivery failed");
    }
}

fn print_entries(entries: &[RankedEntry]) {
    if entries.is_empty() {
        println!("(no entries)");
        return;
    }
    for (i, r) in entries.iter().enumerate() {
        println!(
            "{:>2}. [{:>5.2}] {} ({})",
            i + 1,
            r.rating,
            r.entry.title,
            r.entry.source_name
        );
        println!("      {}", r.entry.link);
    }
}
