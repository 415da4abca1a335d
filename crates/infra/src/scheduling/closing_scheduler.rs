//! Daily-closing generation scheduler.
//!
//! A cron job inside the quiet overnight window (02:00 by default) scans
//! the trailing days of register movement and enqueues any (company, date,
//! station) combination that has no pending-closing row yet. Join handles
//! are tracked, cancellation is explicit, and every asynchronous operation
//! is wrapped in a timeout.

use std::sync::Arc;
use std::time::Duration;

use cashlink_core::sync::ports::ClosingsQueue;
use cashlink_domain::constants::CLOSING_LOOKBACK_DAYS;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the closing scheduler.
#[derive(Debug, Clone)]
pub struct ClosingSchedulerConfig {
    /// Cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Trailing window scanned for missing closings.
    pub lookback_days: i64,
    /// Timeout applied to a single scan execution.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for ClosingSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 2 * * *".into(), // daily at 02:00
            lookback_days: CLOSING_LOOKBACK_DAYS,
            job_timeout: Duration::from_secs(120),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Daily-closing scheduler with explicit lifecycle management.
pub struct ClosingScheduler {
    scheduler: Option<JobScheduler>,
    config: ClosingSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    closings_queue: Arc<dyn ClosingsQueue>,
    company_ids: Vec<i64>,
}

impl ClosingScheduler {
    /// Create a scheduler with the default configuration.
    pub fn new(closings_queue: Arc<dyn ClosingsQueue>, company_ids: Vec<i64>) -> Self {
        Self::with_config(ClosingSchedulerConfig::default(), closings_queue, company_ids)
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(
        config: ClosingSchedulerConfig,
        closings_queue: Arc<dyn ClosingsQueue>,
        company_ids: Vec<i64>,
    ) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            closings_queue,
            company_ids,
        }
    }

    /// Start the scheduler, spawning the monitoring task.
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        let start_result = tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout(start_timeout))?;
        start_result.map_err(|source| SchedulerError::StartFailed(source.to_string()))?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancel).await;
        });

        self.monitor_handle = Some(handle);
        info!(scheduler = "closing", event = "start", "closing scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let mut scheduler = match self.scheduler.take() {
            Some(scheduler) => scheduler,
            None => return Err(SchedulerError::NotRunning),
        };

        let stop_timeout = self.config.stop_timeout;
        let stop_result =
            tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
                .await
                .map_err(|_| SchedulerError::Timeout(stop_timeout))?;
        stop_result.map_err(|source| SchedulerError::StopFailed(source.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout(join_timeout))?
                .map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))?;
        }

        info!(scheduler = "closing", event = "stop", "closing scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::CreationFailed(source.to_string()))?;
        let cron_expr = self.config.cron_expression.clone();
        let closings_queue = Arc::clone(&self.closings_queue);
        let company_ids = self.company_ids.clone();
        let job_timeout = self.config.job_timeout;
        let lookback_days = self.config.lookback_days;

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let closings_queue = Arc::clone(&closings_queue);
            let company_ids = company_ids.clone();

            Box::pin(async move {
                match tokio::time::timeout(
                    job_timeout,
                    Self::scan(closings_queue, company_ids, lookback_days),
                )
                .await
                {
                    Ok(()) => {
                        debug!(
                            scheduler = "closing",
                            event = "job_complete",
                            "closing scan finished"
                        );
                    }
                    Err(_) => {
                        warn!(
                            scheduler = "closing",
                            event = "job_timeout",
                            timeout_secs = job_timeout.as_secs(),
                            "closing scan timed out"
                        );
                    }
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        let job_id = job_definition.guid();
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        debug!(
            cron = %self.config.cron_expression,
            job_id = %job_id,
            "registered closing scan job"
        );
        Ok(scheduler)
    }

    /// One scan pass over every company. Per-company failures are logged
    /// and do not stop the remaining companies.
    async fn scan(
        closings_queue: Arc<dyn ClosingsQueue>,
        company_ids: Vec<i64>,
        lookback_days: i64,
    ) {
        let today = chrono::Local::now().date_naive();
        for company_id in company_ids {
            match closings_queue.enqueue_missing(company_id, lookback_days, today).await {
                Ok(created) if created > 0 => {
                    info!(company_id, created, "enqueued missing daily closings");
                }
                Ok(_) => {
                    debug!(company_id, "no missing daily closings");
                }
                Err(err) => {
                    error!(company_id, error = %err, "closing scan failed for company");
                }
            }
        }
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!(
            scheduler = "closing",
            event = "monitor_cancelled",
            "closing scheduler monitor cancelled"
        );
    }
}

impl Drop for ClosingScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(
                scheduler = "closing",
                event = "drop_cancel",
                "ClosingScheduler dropped while running; cancelling tasks"
            );
            self.cancellation.cancel();
        }
    }
}
