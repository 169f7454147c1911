use anyhow::Result;
use chrono::{Local, NaiveDateTime, NaiveTime};
use common::ScheduleMode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::delivery::{period_label_for_hours, Deliver};
use crate::pipeline::IngestionPipeline;

/// Pause after a failed cycle in interval mode.
pub const INTERVAL_ERROR_BACKOFF: Duration = Duration::from_secs(60);
/// Pause after a failed cycle in daily mode, before the next target is computed.
pub const DAILY_ERROR_BACKOFF: Duration = Duration::from_secs(3600);

/// Drives recurring fetch → rank → persist → deliver cycles.
///
/// Cycles never overlap. `stop` is cooperative: the running flag is checked between
/// cycles and sleeps, an in-flight fetch or sleep is not interrupted.
pub struct Scheduler {
    mode: ScheduleMode,
    pipeline: Arc<IngestionPipeline>,
    delivery: Arc<dyn Deliver>,
    top_n: usize,
    running: AtomicBool,
    interval_backoff: Duration,
    daily_backoff: Duration,
}

impl Scheduler {
    pub fn new(
        mode: ScheduleMode,
        pipeline: Arc<IngestionPipeline>,
        delivery: Arc<dyn Deliver>,
        top_n: usize,
    ) -> Self {
        info!(?mode, top_n, "scheduler initialized");
        Self {
            mode,
            pipeline,
            delivery,
            top_n,
            running: AtomicBool::new(false),
            interval_backoff: INTERVAL_ERROR_BACKOFF,
            daily_backoff: DAILY_ERROR_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, interval: Duration, daily: Duration) -> Self {
        self.interval_backoff = interval;
        self.daily_backoff = daily;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs the schedule until `stop` is called. Returns immediately in manual mode
    /// or when the scheduler is already running.
    pub async fn start(&self) {
        if let ScheduleMode::Manual = self.mode {
            info!("scheduler in manual mode, automatic delivery disabled");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return;
        }
        info!("scheduler started");

        match self.mode {
            ScheduleMode::Interval(every) => self.run_interval(every).await,
            ScheduleMode::Daily(at) => self.run_daily(at).await,
            ScheduleMode::Manual => {}
        }

        info!("scheduler loop exited");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("scheduler stop requested");
    }

    async fn run_interval(&self, every: Duration) {
        info!(interval_secs = every.as_secs(), "interval schedule running");
        while self.is_running() {
            let pause = match self.run_cycle().await {
                Ok(_) => every,
                Err(e) => {
                    error!(error = %e, backoff_secs = self.interval_backoff.as_secs(), "scheduled cycle failed");
                    self.interval_backoff
                }
            };
            if !self.is_running() {
                break;
            }
            tokio::time::sleep(pause).await;
        }
    }

    async fn run_daily(&self, at: NaiveTime) {
        info!(at = %at.format("%H:%M"), "daily schedule running");
        while self.is_running() {
            let wait = next_daily_delay(Local::now().naive_local(), at);
            info!(wait_secs = wait.as_secs(), "waiting for next daily run");
            tokio::time::sleep(wait).await;
            if !self.is_running() {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                error!(error = %e, backoff_secs = self.daily_backoff.as_secs(), "scheduled cycle failed");
                tokio::time::sleep(self.daily_backoff).await;
            }
        }
    }

    /// One cycle: ingest, take the top entries and hand them to delivery. Returns how
    /// many entries were handed over. Delivery failures are logged, not returned.
    pub async fn run_cycle(&self) -> Result<usize> {
        info!("scheduled cycle starting");
        let outcome = self.pipeline.run_once().await?;
        info!(saved = outcome.new_count(), total = outcome.ranked.len(), "entries persisted");

        let top = outcome.top(self.top_n);
        if top.is_empty() {
            warn!("no entries to deliver");
            return Ok(0);
        }

        let period = period_label(&self.mode);
        if self.delivery.deliver(&top, &period).await {
            info!(count = top.len(), period = %period, "scheduled digest delivered");
        } else {
            warn!(count = top.len(), period = %period, "scheduled digest delivery failed");
        }
        Ok(top.len())
    }
}

/// Time until the next occurrence of `at`: today if it has not passed yet, else tomorrow.
pub fn next_daily_delay(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let mut target = now.date().and_time(at);
    if now.time() > at {
        target += chrono::Duration::days(1);
    }
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Label describing the window a cycle in `mode` covers.
pub fn period_label(mode: &ScheduleMode) -> String {
    match mode {
        ScheduleMode::Interval(every) => period_label_for_hours(every.as_secs() / 3600),
        ScheduleMode::Daily(_) | ScheduleMode::Manual => "today".to_string(),
    }
}
