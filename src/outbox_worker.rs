//! # Outbox Worker
//!
//! Background worker that drains the outbox queue: leases due delivery
//! jobs, pushes each through the multi-channel dispatcher under the send
//! rate gates, and records the outcome. Failed jobs stay `pending` with an
//! exponential backoff until the attempt budget is spent, then go `dead`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::channels::{
    Channel, ChannelSender, DispatchStrategy, JobPayload, SendContext, try_channels,
};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::outbox_job;
use crate::rate_limit::RateLimiter;
use crate::repositories::{JobCompletion, OutboxRepository, ReviewInviteRepository};

/// Delay in milliseconds before the next attempt, given the number of
/// failures so far: `min(15, 2^attempts)` minutes.
pub fn compute_next_backoff_ms(attempts: i32) -> i64 {
    let exponent = attempts.clamp(0, 10) as u32;
    let minutes = (1_i64 << exponent).min(15);
    minutes * 60 * 1000
}

/// Counters from one worker pass, returned to the cron trigger.
#[derive(Debug, Default, Clone, Copy, Serialize, ToSchema)]
pub struct WorkerRunStats {
    /// Jobs leased in this pass
    pub leased: u64,
    /// Jobs delivered on at least one channel
    pub succeeded: u64,
    /// Jobs rescheduled with backoff
    pub retried: u64,
    /// Jobs that spent their attempt budget
    pub dead: u64,
}

enum JobOutcome {
    Delivered,
    Rescheduled,
    Dead,
}

/// Background delivery worker for outbox jobs
pub struct OutboxWorker {
    config: Arc<AppConfig>,
    outbox_repo: OutboxRepository,
    invite_repo: ReviewInviteRepository,
    senders: Vec<Arc<dyn ChannelSender>>,
    limiter: Arc<RateLimiter>,
    worker_id: String,
}

impl OutboxWorker {
    /// Create a new worker with a process-unique lease identity
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        senders: Vec<Arc<dyn ChannelSender>>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            outbox_repo: OutboxRepository::new(db.clone()),
            invite_repo: ReviewInviteRepository::new(db),
            senders,
            limiter,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Run the delivery loop until the provided shutdown token fires
    #[instrument(skip_all, fields(worker_id = %self.worker_id))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ApiError> {
        info!("Starting outbox worker");
        let tick_interval = TokioDuration::from_millis(self.config.worker.tick_ms);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Outbox worker shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let pass_started = std::time::Instant::now();
                    if let Err(err) = self.run_once().await {
                        error!(error = ?err, "Outbox worker pass failed");
                    }
                    let elapsed = pass_started.elapsed();
                    histogram!("outbox_worker_pass_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Outbox worker stopped");
        Ok(())
    }

    /// Lease one batch of due jobs and deliver them
    #[instrument(skip_all, fields(worker_id = %self.worker_id))]
    pub async fn run_once(&self) -> Result<WorkerRunStats, ApiError> {
        let mut stats = WorkerRunStats::default();

        let jobs = self
            .outbox_repo
            .lease_pending_jobs(
                &self.worker_id,
                self.config.worker.batch_size as u64,
                self.config.worker.lease_seconds as i64,
            )
            .await?;

        stats.leased = jobs.len() as u64;
        if jobs.is_empty() {
            return Ok(stats);
        }

        for job in jobs {
            match self.deliver_job(&job).await {
                Ok(JobOutcome::Delivered) => stats.succeeded += 1,
                Ok(JobOutcome::Rescheduled) => stats.retried += 1,
                Ok(JobOutcome::Dead) => stats.dead += 1,
                Err(err) => {
                    // The job keeps its lease and becomes leasable again
                    // once the lease window passes.
                    error!(job_id = %job.id, error = ?err, "Failed to record outbox job outcome");
                }
            }
        }

        counter!("outbox_worker_succeeded_total").increment(stats.succeeded);
        counter!("outbox_worker_retried_total").increment(stats.retried);
        counter!("outbox_worker_dead_total").increment(stats.dead);

        info!(
            leased = stats.leased,
            succeeded = stats.succeeded,
            retried = stats.retried,
            dead = stats.dead,
            "Outbox worker pass completed"
        );

        Ok(stats)
    }

    /// Dispatch one leased job and record the outcome
    async fn deliver_job(&self, job: &outbox_job::Model) -> Result<JobOutcome, ApiError> {
        let payload: JobPayload = serde_json::from_value(job.payload.clone()).unwrap_or_default();
        let requested: Vec<Channel> =
            serde_json::from_value(job.channels.clone()).unwrap_or_default();
        let senders = ordered_senders(&self.senders, &requested);

        if senders.is_empty() {
            warn!(job_id = %job.id, channels = ?job.channels, "Outbox job requests no deliverable channel");
        }

        let ctx = SendContext {
            store_uid: job.store_uid.clone(),
            job_id: job.id,
        };

        let outcome = try_channels(
            &senders,
            &payload,
            &ctx,
            DispatchStrategy::FirstSuccess,
            &self.limiter,
        )
        .await;

        if outcome.ok {
            self.outbox_repo
                .complete_job(
                    job.id,
                    JobCompletion {
                        status: "ok".to_string(),
                        attempts: job.attempts + 1,
                        next_attempt_at: None,
                        last_error: None,
                    },
                )
                .await?;

            // The invite status is advisory; delivery already happened, so a
            // failure here must not fail the job.
            if let Err(err) = self.invite_repo.mark_notified(job.invite_id).await {
                warn!(
                    job_id = %job.id,
                    invite_id = %job.invite_id,
                    error = ?err,
                    "Delivered but failed to mark invite notified"
                );
            }

            info!(
                job_id = %job.id,
                channel = ?outcome.first_success_channel,
                "Outbox job delivered"
            );
            return Ok(JobOutcome::Delivered);
        }

        let attempts = job.attempts + 1;
        let last_error = serde_json::to_value(&outcome.attempts).ok();

        if attempts >= self.config.retry_policy.max_attempts {
            self.outbox_repo
                .complete_job(
                    job.id,
                    JobCompletion {
                        status: "dead".to_string(),
                        attempts,
                        next_attempt_at: None,
                        last_error,
                    },
                )
                .await?;

            warn!(job_id = %job.id, attempts, "Outbox job exhausted its attempt budget");
            return Ok(JobOutcome::Dead);
        }

        let delay_ms = compute_next_backoff_ms(job.attempts);
        let next_attempt_at = (Utc::now() + Duration::milliseconds(delay_ms)).fixed_offset();

        self.outbox_repo
            .complete_job(
                job.id,
                JobCompletion {
                    status: "pending".to_string(),
                    attempts,
                    next_attempt_at: Some(next_attempt_at),
                    last_error,
                },
            )
            .await?;

        debug!(job_id = %job.id, attempts, delay_ms, "Outbox job rescheduled");
        Ok(JobOutcome::Rescheduled)
    }
}

/// Pick the senders matching the job's requested channels, SMS before email.
fn ordered_senders(
    senders: &[Arc<dyn ChannelSender>],
    requested: &[Channel],
) -> Vec<Arc<dyn ChannelSender>> {
    let mut ordered = Vec::new();
    for channel in [Channel::Sms, Channel::Email] {
        if requested.contains(&channel) {
            if let Some(sender) = senders.iter().find(|s| s.channel() == channel) {
                ordered.push(sender.clone());
            }
        }
    }
    ordered
}
