use anyhow::{Context, Result};
use common::FetchConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Terminal failure of a fetch after all attempts were used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Retrieves raw feed bytes for a URL.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher with a per-attempt timeout and fixed retry delay.
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
        })
    }

    async fn attempt(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        // The body is accepted whole or not at all
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let mut last_error = FetchError::Network("no attempt made".to_string());

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                debug!(url, attempt, delay = ?self.retry_delay, "retrying feed fetch");
                tokio::time::sleep(self.retry_delay).await;
            }

            match self.attempt(url).await {
                Ok(bytes) => {
                    debug!(url, bytes = bytes.len(), "fetched feed");
                    return Ok(bytes);
                }
                Err(e) => {
                    warn!(url, attempt, max = self.max_retries, error = %e, "feed fetch attempt failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
