//! Scheduled jobs for periodic media maintenance.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tootbox_common::{AppResult, SchedulerSettings};
use tootbox_core::MediaAttachmentService;

/// Attachments handled per scheduler tick.
pub const DEFAULT_BATCH_SIZE: u64 = 100;

/// Scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledJob {
    /// Re-enqueue uploads that never left `Received`.
    RequeueStuckUploads,
    /// Delete uploads that ended in `Error` a while ago.
    PurgeFailedUploads,
    /// Fail uploads left in `Processing` by a worker that died.
    FailStalledUploads,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval for the stuck upload sweep (default: 5 minutes).
    pub requeue_interval: Duration,
    /// Age after which a `Received` upload counts as stuck (default: 10 minutes).
    pub requeue_after: Duration,
    /// Interval for the failed upload purge (default: 1 hour).
    pub purge_interval: Duration,
    /// How long failed uploads are kept (default: 7 days).
    pub error_retention: Duration,
    /// Time without progress after which processing is given up (default: 30 minutes).
    pub processing_timeout: Duration,
    pub batch_size: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            requeue_interval: Duration::from_secs(settings.requeue_interval_secs.max(1)),
            requeue_after: Duration::from_secs(settings.requeue_after_secs),
            purge_interval: Duration::from_secs(3600),
            error_retention: Duration::from_secs(settings.error_retention_secs),
            processing_timeout: Duration::from_secs(settings.processing_timeout_secs),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SchedulerConfig {
    /// Cutoff for `job` relative to `now`.
    #[must_use]
    pub fn cutoff(&self, job: ScheduledJob, now: DateTime<Utc>) -> DateTime<Utc> {
        let age = match job {
            ScheduledJob::RequeueStuckUploads => self.requeue_after,
            ScheduledJob::PurgeFailedUploads => self.error_retention,
            ScheduledJob::FailStalledUploads => self.processing_timeout,
        };
        chrono::Duration::from_std(age).map_or(DateTime::<Utc>::MIN_UTC, |age| now - age)
    }

    /// How often `job` runs.
    #[must_use]
    pub const fn interval(&self, job: ScheduledJob) -> Duration {
        match job {
            ScheduledJob::RequeueStuckUploads | ScheduledJob::FailStalledUploads => {
                self.requeue_interval
            }
            ScheduledJob::PurgeFailedUploads => self.purge_interval,
        }
    }
}

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    /// Hand uploads stuck in `Received` since before `older_than` back to processing.
    async fn requeue_stuck_uploads(&self, older_than: DateTime<Utc>, limit: u64)
    -> AppResult<usize>;

    /// Delete uploads that failed before `older_than`.
    async fn purge_failed_uploads(&self, older_than: DateTime<Utc>, limit: u64)
    -> AppResult<usize>;

    /// Fail uploads still `Processing` without an update since `stalled_since`.
    async fn fail_stalled_uploads(
        &self,
        stalled_since: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<usize>;
}

#[async_trait::async_trait]
impl JobExecutor for MediaAttachmentService {
    async fn requeue_stuck_uploads(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<usize> {
        self.requeue_received(older_than, limit).await
    }

    async fn purge_failed_uploads(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<usize> {
        self.purge_errored(older_than, limit).await
    }

    async fn fail_stalled_uploads(
        &self,
        stalled_since: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<usize> {
        self.fail_stalled(stalled_since, limit).await
    }
}

/// Run a single scheduled job once.
pub async fn run_job<E: JobExecutor + ?Sized>(
    job: ScheduledJob,
    config: &SchedulerConfig,
    executor: &E,
) -> AppResult<usize> {
    let older_than = config.cutoff(job, Utc::now());
    match job {
        ScheduledJob::RequeueStuckUploads => {
            executor
                .requeue_stuck_uploads(older_than, config.batch_size)
                .await
        }
        ScheduledJob::PurgeFailedUploads => {
            executor
                .purge_failed_uploads(older_than, config.batch_size)
                .await
        }
        ScheduledJob::FailStalledUploads => {
            executor
                .fail_stalled_uploads(older_than, config.batch_size)
                .await
        }
    }
}

/// Run the scheduler with the given configuration and executor.
pub async fn run_scheduler<E: JobExecutor + 'static>(config: SchedulerConfig, executor: Arc<E>) {
    for job in [
        ScheduledJob::RequeueStuckUploads,
        ScheduledJob::PurgeFailedUploads,
        ScheduledJob::FailStalledUploads,
    ] {
        let executor = executor.clone();
        let config = config.clone();

        tokio::spawn(async move {
            let mut interval = interval(config.interval(job));
            loop {
                interval.tick().await;
                match run_job(job, &config, executor.as_ref()).await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!(?job, count, "Scheduled job finished");
                        }
                    }
                    Err(e) => {
                        tracing::error!(?job, error = %e, "Scheduled job failed");
                    }
                }
            }
        });
    }
}
