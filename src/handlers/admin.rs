//! # Admin API Handlers
//!
//! Operator-facing endpoints for the retry queue, the dead letter queue,
//! and the outbox. All routes sit behind operator bearer authentication.

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{self, ApiError};
use crate::models::{outbox_job, webhook_dlq};
use crate::repositories::{OutboxRepository, WebhookDlqRepository};
use crate::server::AppState;
use crate::webhook_retry::{RetrySystemHealth, WebhookRetryProcessor};

const DEFAULT_LIST_LIMIT: u64 = 50;
const MAX_LIST_LIMIT: u64 = 100;

/// Retry queue status returned to operators.
#[derive(Debug, Serialize, ToSchema)]
pub struct RetryQueueStatus {
    /// Retry budget shared by the outbox and the webhook retry queue.
    pub max_attempts: i32,
    pub health: RetrySystemHealth,
}

/// Request body for DLQ actions.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DlqActionRequest {
    /// One of `retry`, `resolve`.
    pub action: String,
    pub dlq_id: Uuid,
    /// Identity recorded on the entry; defaults to `operator`.
    pub operator_id: Option<String>,
    /// Required for `resolve`: one of `ignored`, `manual_fix`.
    pub resolution: Option<String>,
    pub notes: Option<String>,
}

/// Result of a DLQ action.
#[derive(Debug, Serialize, ToSchema)]
pub struct DlqActionResponse {
    pub action: String,
    pub dlq_id: Uuid,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonValue>,
}

/// One dead letter queue entry as presented to operators.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DlqEntryInfo {
    pub id: Uuid,
    pub platform: String,
    pub event_key: String,
    /// Original webhook payload, kept for manual replay.
    pub payload: JsonValue,
    pub attempts: i32,
    pub last_error: Option<JsonValue>,
    pub first_failed_at: String,
    pub resolution: String,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
    pub resolution_notes: Option<String>,
    pub created_at: String,
}

impl From<webhook_dlq::Model> for DlqEntryInfo {
    fn from(model: webhook_dlq::Model) -> Self {
        Self {
            id: model.id,
            platform: model.platform,
            event_key: model.event_key,
            payload: model.payload,
            attempts: model.attempts,
            last_error: model.last_error,
            first_failed_at: model.first_failed_at.to_rfc3339(),
            resolution: model.resolution,
            resolved_by: model.resolved_by,
            resolved_at: model.resolved_at.map(|dt| dt.to_rfc3339()),
            resolution_notes: model.resolution_notes,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Query parameters for the DLQ listing.
#[derive(Debug, Deserialize)]
pub struct ListDlqQuery {
    /// Maximum number of entries to return (default 50, max 100).
    pub limit: Option<u64>,
    /// Return entries older than this entry id.
    pub start_after: Option<Uuid>,
    /// Only entries no operator has resolved yet.
    pub only_unreviewed: Option<bool>,
}

/// Response payload for the DLQ listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DlqListResponse {
    pub entries: Vec<DlqEntryInfo>,
    /// Cursor for the next page (null when this page was not full).
    pub next_start_after: Option<Uuid>,
}

/// One outbox job as presented to operators.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OutboxJobInfo {
    pub id: Uuid,
    pub invite_id: Uuid,
    pub store_uid: String,
    pub channels: JsonValue,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: String,
    pub last_error: Option<JsonValue>,
    pub locked_by: Option<String>,
    pub locked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<outbox_job::Model> for OutboxJobInfo {
    fn from(model: outbox_job::Model) -> Self {
        Self {
            id: model.id,
            invite_id: model.invite_id,
            store_uid: model.store_uid,
            channels: model.channels,
            status: model.status,
            attempts: model.attempts,
            next_attempt_at: model.next_attempt_at.to_rfc3339(),
            last_error: model.last_error,
            locked_by: model.locked_by,
            locked_at: model.locked_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Query parameters for the outbox listing.
#[derive(Debug, Deserialize)]
pub struct ListOutboxQuery {
    /// Filter by job status (one of: pending, ok, dead).
    pub status: Option<String>,
    /// Maximum number of jobs to return (default 50, max 100).
    pub limit: Option<u64>,
    /// Number of jobs to skip.
    pub offset: Option<u64>,
}

/// Response payload for the outbox listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OutboxListResponse {
    pub jobs: Vec<OutboxJobInfo>,
}

fn validated_limit(limit: Option<u64>) -> Result<u64, ApiError> {
    match limit {
        Some(0) => Err(error::validation_error(
            "Invalid limit",
            json!({ "limit": "Minimum allowed limit is 1" }),
        )),
        Some(v) if v > MAX_LIST_LIMIT => Err(error::validation_error(
            "Invalid limit",
            json!({ "limit": "Maximum allowed limit is 100" }),
        )),
        Some(v) => Ok(v),
        None => Ok(DEFAULT_LIST_LIMIT),
    }
}

/// Retry queue and DLQ status
#[utoipa::path(
    get,
    path = "/api/webhooks/retry",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Retry queue status", body = RetryQueueStatus),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn retry_queue_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<RetryQueueStatus>, ApiError> {
    let processor = WebhookRetryProcessor::new(state.config.clone(), state.db.clone());
    let health = processor.check_retry_system_health().await?;

    Ok(Json(RetryQueueStatus {
        max_attempts: state.config.retry_policy.max_attempts,
        health,
    }))
}

/// Act on a DLQ entry
///
/// `retry` replays the parked webhook immediately; `resolve` closes the
/// entry without reprocessing.
#[utoipa::path(
    post,
    path = "/api/webhooks/retry",
    security(("bearer_auth" = [])),
    request_body = DlqActionRequest,
    responses(
        (status = 200, description = "Action applied", body = DlqActionResponse),
        (status = 400, description = "Unknown action or missing resolution", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "DLQ entry not found", body = ApiError),
        (status = 409, description = "Entry already resolved", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn act_on_dlq_entry(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<DlqActionRequest>,
) -> Result<Json<DlqActionResponse>, ApiError> {
    let processor = WebhookRetryProcessor::new(state.config.clone(), state.db.clone());
    let operator_id = request.operator_id.as_deref().unwrap_or("operator");

    match request.action.as_str() {
        "retry" => {
            let outcome = processor
                .manual_retry_webhook(request.dlq_id, operator_id)
                .await?;
            Ok(Json(DlqActionResponse {
                action: request.action,
                dlq_id: request.dlq_id,
                succeeded: outcome.succeeded,
                resolution: outcome.succeeded.then(|| "manual_fix".to_string()),
                error: outcome.error,
            }))
        }
        "resolve" => {
            let resolution = request.resolution.as_deref().ok_or_else(|| {
                error::validation_error(
                    "Resolution is required for the resolve action",
                    json!({ "resolution": "required" }),
                )
            })?;
            let resolved = processor
                .resolve_dlq_entry(request.dlq_id, operator_id, resolution, request.notes)
                .await?;
            Ok(Json(DlqActionResponse {
                action: request.action,
                dlq_id: request.dlq_id,
                succeeded: true,
                resolution: Some(resolved.resolution),
                error: None,
            }))
        }
        other => Err(error::validation_error(
            "Unknown DLQ action",
            json!({ "action": format!("'{}' is not one of: retry, resolve", other) }),
        )),
    }
}

/// List dead letter queue entries
#[utoipa::path(
    get,
    path = "/api/webhooks/failed",
    security(("bearer_auth" = [])),
    params(
        ("limit" = Option<u64>, Query, description = "Maximum number of entries to return (default 50, max 100)"),
        ("start_after" = Option<Uuid>, Query, description = "Return entries older than this entry id"),
        ("only_unreviewed" = Option<bool>, Query, description = "Only entries no operator has resolved yet")
    ),
    responses(
        (status = 200, description = "DLQ entries, newest first", body = DlqListResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "start_after entry not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn list_failed_webhooks(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(params): Query<ListDlqQuery>,
) -> Result<Json<DlqListResponse>, ApiError> {
    let limit = validated_limit(params.limit)?;
    let only_unreviewed = params.only_unreviewed.unwrap_or(false);

    let dlq_repo = WebhookDlqRepository::new(state.db.clone());
    let entries = dlq_repo
        .list(limit, params.start_after, only_unreviewed)
        .await?;

    let next_start_after = if entries.len() as u64 == limit {
        entries.last().map(|entry| entry.id)
    } else {
        None
    };

    Ok(Json(DlqListResponse {
        entries: entries.into_iter().map(DlqEntryInfo::from).collect(),
        next_start_after,
    }))
}

/// List outbox jobs
#[utoipa::path(
    get,
    path = "/api/jobs",
    security(("bearer_auth" = [])),
    params(
        ("status" = Option<String>, Query, description = "Filter by job status (pending, ok, dead)"),
        ("limit" = Option<u64>, Query, description = "Maximum number of jobs to return (default 50, max 100)"),
        ("offset" = Option<u64>, Query, description = "Number of jobs to skip")
    ),
    responses(
        (status = 200, description = "Outbox jobs, newest first", body = OutboxListResponse),
        (status = 400, description = "Invalid query parameters", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn list_outbox_jobs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(params): Query<ListOutboxQuery>,
) -> Result<Json<OutboxListResponse>, ApiError> {
    let limit = validated_limit(params.limit)?;

    let status = match params.status.as_deref() {
        Some("pending") | Some("ok") | Some("dead") | None => params.status.clone(),
        Some(_) => {
            return Err(error::validation_error(
                "Invalid status",
                json!({ "status": "Must be one of: pending, ok, dead" }),
            ));
        }
    };

    let outbox_repo = OutboxRepository::new(state.db.clone());
    let jobs = outbox_repo
        .list_jobs(status, limit, params.offset.unwrap_or(0))
        .await?;

    Ok(Json(OutboxListResponse {
        jobs: jobs.into_iter().map(OutboxJobInfo::from).collect(),
    }))
}
