use anyhow::{Context, Result};
use common::DeliveryConfig;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::entry::RankedEntry;

/// Downstream sink for digests. Failures are reported as `false`, never raised.
#[async_trait::async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, entries: &[RankedEntry], period: &str) -> bool;
}

/// Human-facing label for a window of `hours`.
pub fn period_label_for_hours(hours: u64) -> String {
    match hours {
        0 | 1 => "last hour".to_string(),
        h if h < 24 => format!("last {} hours", h),
        _ => "today".to_string(),
    }
}

/// Writes the digest to the log. Used when no webhook is configured.
pub struct LogDelivery;

#[async_trait::async_trait]
impl Deliver for LogDelivery {
    async fn deliver(&self, entries: &[RankedEntry], period: &str) -> bool {
        if entries.is_empty() {
            warn!(period, "nothing to deliver");
            return false;
        }
        info!(period, count = entries.len(), "digest");
        for (i, ranked) in entries.iter().enumerate() {
            info!(
                rank = i + 1,
                rating = ranked.rating,
                source = %ranked.entry.source_name,
                link = %ranked.entry.link,
                "{}",
                ranked.entry.title
            );
        }
        true
    }
}

#[derive(Serialize)]
struct DigestPayload<'a> {
    period: &'a str,
    entries: &'a [RankedEntry],
}

/// POSTs the digest as JSON to a webhook.
pub struct WebhookDelivery {
    client: Client,
    url: String,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl Deliver for WebhookDelivery {
    async fn deliver(&self, entries: &[RankedEntry], period: &str) -> bool {
        if entries.is_empty() {
            warn!(period, "nothing to deliver");
            return false;
        }

        let payload = DigestPayload { period, entries };
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(period, count = entries.len(), "digest delivered to webhook");
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(%status, body = %body, "webhook rejected digest");
                false
            }
            Err(e) => {
                error!(error = %e, "webhook delivery failed");
                false
            }
        }
    }
}

/// Picks the sink from configuration: webhook when a URL is set, log otherwise.
pub fn from_config(config: &DeliveryConfig) -> Result<Arc<dyn Deliver>> {
    match config.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            info!(url, "delivering digests to webhook");
            Ok(Arc::new(WebhookDelivery::new(url, config.timeout_seconds)?))
        }
        _ => {
            info!("no webhook configured, digests go to the log");
            Ok(Arc::new(LogDelivery))
        }
    }
}
