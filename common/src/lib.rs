/*!
common/src/lib.rs

Shared configuration types and DB helper functions for newsdigest.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that merges a default file with an override file
- Helpers to initialize and migrate an SQLite database
*/

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/newsdigest.db")
    pub path: String,
}

/// Language a source publishes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ru,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "ru" => Ok(Language::Ru),
            other => Err(anyhow!("unknown language: {}", other)),
        }
    }
}

/// A configured syndication feed. Immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub language: Language,
    /// Relevance weight in [0, 10]
    pub weight: f64,
}

/// HTTP fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
            user_agent: "newsdigest/0.1.0".to_string(),
        }
    }
}

/// Weights of the four scoring terms. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub freshness: f64,
    pub source: f64,
    pub keywords: f64,
    pub length: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            freshness: 0.3,
            source: 0.25,
            keywords: 0.25,
            length: 0.2,
        }
    }
}

impl RankingWeights {
    pub fn sum(&self) -> f64 {
        self.freshness + self.source + self.keywords + self.length
    }
}

/// Scoring configuration group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub weights: RankingWeights,
    pub rating_min: f64,
    pub rating_max: f64,
    /// Weight assumed for sources missing from the weight table
    pub default_source_weight: f64,
    /// Relevance vocabulary (matched as whole words, case-insensitive)
    pub keywords: Vec<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weights: RankingWeights::default(),
            rating_min: 0.0,
            rating_max: 10.0,
            default_source_weight: 5.0,
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// "manual", "interval" or "daily"
    pub mode: String,
    /// Interval preset: "hourly", "3hours", "6hours" or "daily"
    pub interval: String,
    /// Explicit interval, takes precedence over the preset
    pub interval_seconds: Option<u64>,
    /// Wall-clock time in "HH:MM" 24h format for daily mode
    pub daily_time: String,
    /// Number of entries handed to delivery after each cycle
    pub top_n: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: "manual".to_string(),
            interval: "hourly".to_string(),
            interval_seconds: None,
            daily_time: "09:00".to_string(),
            top_n: 4,
        }
    }
}

/// Trigger mode of the scheduler, resolved from [`SchedulerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Manual,
    Interval(Duration),
    Daily(NaiveTime),
}

impl SchedulerConfig {
    /// Interval length for the configured preset (or the explicit override).
    pub fn interval_duration(&self) -> Result<Duration> {
        if let Some(secs) = self.interval_seconds {
            if secs == 0 {
                bail!("scheduler.interval_seconds must be positive");
            }
            return Ok(Duration::from_secs(secs));
        }
        let secs = match self.interval.as_str() {
            "hourly" => 3600,
            "3hours" => 10_800,
            "6hours" => 21_600,
            "daily" => 86_400,
            other => bail!("unknown scheduler interval preset: {}", other),
        };
        Ok(Duration::from_secs(secs))
    }

    pub fn schedule_mode(&self) -> Result<ScheduleMode> {
        match self.mode.as_str() {
            "manual" => Ok(ScheduleMode::Manual),
            "interval" => Ok(ScheduleMode::Interval(self.interval_duration()?)),
            "daily" => {
                let at = NaiveTime::parse_from_str(&self.daily_time, "%H:%M").with_context(|| {
                    format!("invalid scheduler.daily_time '{}', expected HH:MM", self.daily_time)
                })?;
                Ok(ScheduleMode::Daily(at))
            }
            other => bail!("unknown scheduler mode: {}", other),
        }
    }
}

/// Outbound delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// When set, digests are POSTed here as JSON; otherwise they are logged
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_seconds: 15,
        }
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for s in &self.sources {
            url::Url::parse(&s.url)
                .with_context(|| format!("source '{}' has an invalid url: {}", s.name, s.url))?;
            if !(0.0..=10.0).contains(&s.weight) {
                bail!("source '{}' weight {} is outside [0, 10]", s.name, s.weight);
            }
            if !names.insert(s.name.as_str()) {
                bail!("duplicate source name: {}", s.name);
            }
        }

        let w = &self.ranking.weights;
        if [w.freshness, w.source, w.keywords, w.length].iter().any(|v| *v < 0.0) {
            bail!("ranking weights must be non-negative");
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            bail!("ranking weights must sum to 1.0 (got {})", w.sum());
        }
        if self.ranking.rating_min > self.ranking.rating_max {
            bail!("ranking.rating_min must not exceed ranking.rating_max");
        }

        if self.fetch.timeout_seconds == 0 {
            bail!("fetch.timeout_seconds must be positive");
        }
        if self.scheduler.top_n == 0 {
            bail!("scheduler.top_n must be positive");
        }

        self.scheduler.schedule_mode()?;
        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Run SQL migrations using sqlx's migration macro.
/// Migrations live in the workspace-level `migrations` directory.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .context("Failed to run sqlx migrations")?;

    Ok(())
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory if necessary and returns a configured `SqlitePool`
/// with a modest connection count.
///
/// Example:
///   let pool = init_db_pool("data/newsdigest.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

/// Built-in bilingual relevance vocabulary.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "vibe coding", "вайб кодинг", "coding vibe", "атмосфера программирования",
    "programming", "программирование",
    "coding", "кодинг", "кодирование",
    "development", "разработка",
    "software development", "разработка софта",
    "app development", "разработка приложений",
    "web development", "веб-разработка",
    "backend", "бэкенд", "backend development", "разработка бэкенда",
    "frontend", "фронтенд", "frontend development", "разработка фронтенда",
    "fullstack", "фулстек", "fullstack developer", "фулстек разработчик",
    "code", "код",
    "source code", "исходный код",
    "clean code", "чистый код",
    "developer", "разработчик",
    "software engineer", "инженер-программист",
    "programmer", "программист",
    "ai developer", "разработчик интеллект",
    "machine learning engineer", "инженер по машинному обучению",
    "artificial intelligence", "искусственный интеллект", "ai", "ии",
    "machine learning", "машинное обучение",
    "neural networks", "нейронные сети",
    "deep learning", "глубокое обучение",
    "ml engineer", "ml инженер",
    "ai tools", "инструменты ии",
    "cursor", "курсор",
    "cursor ide", "cursor иде", "cursor editor", "editor cursor", "редактор cursor",
    "integrated development environment", "интегрированная среда разработки", "ide", "среда разработки",
    "text editor", "текстовый редактор",
    "git", "гит",
    "github", "гитхаб",
    "version control", "система контроля версий",
    "repository", "репозиторий",
    "command line", "командная строка",
    "terminal", "терминал",
    "python", "питон",
    "javascript", "джаваскрипт",
    "typescript", "тайпскрипт",
    "java", "ява",
    "c++", "си плюс плюс",
    "c#", "си шарп",
    "go", "го",
    "rust", "раст",
    "sql", "скьюэль",
    "algorithm", "алгоритм",
    "data structure", "структура данных",
    "function", "функция",
    "variable", "переменная",
    "loop", "цикл",
    "debug", "отладка",
    "refactor", "рефакторинг",
    "pull request", "пулл-реквест",
    "commit", "коммит",
    "deploy", "деплой",
    "cloud", "облако",
    "open source", "опенсорс",
    "stack overflow", "стэк оверфлоу",
    "best practice", "лучшие практики",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MINIMAL: &str = r#"
        [database]
        path = "data/test.db"

        [[sources]]
        name = "Hacker News"
        url = "https://hnrss.org/newest"
        language = "en"
        weight = 9.0

        [scheduler]
        mode = "daily"
        daily_time = "09:30"
    "#;

    #[test]
    fn config_from_string_uses_defaults() {
        let cfg: Config = toml::from_str(MINIMAL).expect("parse config");
        cfg.validate().expect("valid config");
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].language, Language::En);
        assert_eq!(cfg.fetch.max_retries, 3);
        assert_eq!(cfg.scheduler.top_n, 4);
        assert!(!cfg.ranking.keywords.is_empty());
        assert_eq!(
            cfg.scheduler.schedule_mode().unwrap(),
            ScheduleMode::Daily(NaiveTime::from_hms_opt(9, 30, 0).unwrap())
        );
    }

    #[test]
    fn interval_presets_and_override() {
        let mut s = SchedulerConfig {
            mode: "interval".into(),
            interval: "3hours".into(),
            ..Default::default()
        };
        assert_eq!(s.schedule_mode().unwrap(), ScheduleMode::Interval(Duration::from_secs(10_800)));

        s.interval_seconds = Some(90);
        assert_eq!(s.schedule_mode().unwrap(), ScheduleMode::Interval(Duration::from_secs(90)));

        s.interval_seconds = None;
        s.interval = "weekly".into();
        assert!(s.schedule_mode().is_err());
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.sources[0].weight = 11.0;
        assert!(cfg.validate().is_err());

        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.ranking.weights.length = 0.5;
        assert!(cfg.validate().is_err());

        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.scheduler.daily_time = "25:99".into();
        assert!(cfg.validate().is_err());

        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.sources.push(cfg.sources[0].clone());
        assert!(cfg.validate().is_err());

        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.scheduler.top_n = 0;
        let err = cfg.validate().expect_err("top_n of zero");
        assert!(err.to_string().contains("top_n"));

        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.fetch.timeout_seconds = 0;
        let err = cfg.validate().expect_err("timeout of zero");
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[tokio::test]
    async fn override_file_wins_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");
        fs::write(&default_path, MINIMAL).unwrap();
        fs::write(
            &override_path,
            r#"
            [scheduler]
            mode = "interval"
            interval = "6hours"
            top_n = 10
            "#,
        )
        .unwrap();

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load merged config");
        assert_eq!(cfg.database.path, "data/test.db");
        assert_eq!(cfg.scheduler.top_n, 10);
        assert_eq!(
            cfg.scheduler.schedule_mode().unwrap(),
            ScheduleMode::Interval(Duration::from_secs(21_600))
        );
        // daily_time from the default file survives the merge
        assert_eq!(cfg.scheduler.daily_time, "09:30");
    }

    #[tokio::test]
    async fn db_pool_and_migrations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("newsdigest.db");
        let pool = init_db_pool(&db_path.to_string_lossy()).await.expect("init pool");
        run_migrations(&pool).await.expect("migrate");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&pool)
            .await
            .expect("query entries");
        assert_eq!(count, 0);
    }
}
