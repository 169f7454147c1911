use chrono::Utc;
use common::Config;
use newsdigest::decoder;
use newsdigest::fetcher::{Fetch, HttpFetcher};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let default_path = PathBuf::from("config.default.toml");
    let override_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config.toml")).filter(|p| p.exists()));

    let config = Config::load_with_defaults(
        Some(default_path.as_path()).filter(|p| p.exists()),
        override_path.as_deref(),
    )
    .await?;
    let fetcher = HttpFetcher::new(&config.fetch)?;

    let mut failed = 0;
    for source in &config.sources {
        println!("\n{}", "=".repeat(60));
        println!("{} [{}] {}", source.name, source.language, source.url);
        println!("{}", "=".repeat(60));

        match fetcher.fetch(&source.url).await {
            Ok(bytes) => {
                let entries = decoder::decode(&bytes, source, Utc::now());
                let undated = entries.iter().filter(|e| e.published_fallback).count();
                println!("✓ {} bytes, {} entries ({} without date)", bytes.len(), entries.len(), undated);
                for (i, entry) in entries.iter().take(3).enumerate() {
                    println!("    {}. {}", i + 1, entry.title);
                    println!("       URL: {}", entry.link);
                    println!("       Summary: {} chars", entry.summary.chars().count());
                }
                if entries.is_empty() {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("✗ Failed: {}", e);
                failed += 1;
            }
        }
    }

    println!("\n{} of {} sources usable", config.sources.len() - failed, config.sources.len());
    Ok(())
}
