//! # Cron Trigger Handlers
//!
//! Endpoints for external schedulers, authenticated with the shared cron
//! secret. Both triggers are safe to invoke repeatedly or overlapping:
//! leases and claims keep concurrent passes from double-processing.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::auth::CronAuth;
use crate::error::ApiError;
use crate::outbox_worker::{OutboxWorker, WorkerRunStats};
use crate::server::AppState;
use crate::webhook_retry::{RetryRunStats, WebhookRetryProcessor};

const DEFAULT_RETRY_BATCH: u64 = 50;

/// Query parameters for the retry cron trigger.
#[derive(Debug, Deserialize)]
pub struct RetryCronQuery {
    /// Maximum retry entries to process in this pass (default 50).
    pub limit: Option<u64>,
}

/// Process due webhook retries
#[utoipa::path(
    post,
    path = "/api/cron/webhook-retry",
    security(("bearer_auth" = [])),
    params(
        ("limit" = Option<u64>, Query, description = "Maximum retry entries to process (default 50)")
    ),
    responses(
        (status = 200, description = "Pass finished", body = RetryRunStats),
        (status = 401, description = "Missing or invalid cron secret", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "cron"
)]
pub async fn run_webhook_retry_pass(
    State(state): State<AppState>,
    _cron_auth: CronAuth,
    Query(params): Query<RetryCronQuery>,
) -> Result<Json<RetryRunStats>, ApiError> {
    let processor = WebhookRetryProcessor::new(state.config.clone(), state.db.clone());
    let stats = processor
        .process_retry_queue(params.limit.unwrap_or(DEFAULT_RETRY_BATCH))
        .await?;
    Ok(Json(stats))
}

/// Run one outbox worker pass
#[utoipa::path(
    post,
    path = "/api/jobs/worker-run-once",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pass finished", body = WorkerRunStats),
        (status = 401, description = "Missing or invalid cron secret", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "cron"
)]
pub async fn run_worker_once(
    State(state): State<AppState>,
    _cron_auth: CronAuth,
) -> Result<Json<WorkerRunStats>, ApiError> {
    let worker = OutboxWorker::new(
        state.config.clone(),
        state.db.clone(),
        state.senders.clone(),
        state.limiter.clone(),
    );
    let stats = worker.run_once().await?;
    Ok(Json(stats))
}
