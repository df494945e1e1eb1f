//! # Outbox Repository
//!
//! Repository operations for the outbox_jobs table: enqueueing invite
//! deliveries, leasing due jobs for a worker, and recording completion.
//! The lease is the cross-instance concurrency control, so the claim runs
//! as a transactional select-then-update that tolerates concurrent pollers.

use chrono::{Duration, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::channels::{Channel, JobPayload};
use crate::error::{self, ApiError};
use crate::models::outbox_job::{ActiveModel, Column, Entity, Model};

/// A new outbox job for one review invite.
#[derive(Debug, Clone)]
pub struct NewOutboxJob {
    pub invite_id: Uuid,
    pub store_uid: String,
    pub channels: Vec<Channel>,
    pub payload: JobPayload,
}

/// Final state a worker reports for a finished attempt.
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: Option<DateTimeWithTimeZone>,
    pub last_error: Option<JsonValue>,
}

/// Repository for outbox job database operations
pub struct OutboxRepository {
    db: DatabaseConnection,
}

impl OutboxRepository {
    /// Create a new OutboxRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enqueue a delivery job for a review invite. The job becomes due
    /// immediately and is picked up by the next worker pass.
    pub async fn enqueue_invite_job(&self, new_job: NewOutboxJob) -> Result<Uuid, ApiError> {
        if new_job.channels.is_empty() {
            return Err(error::validation_error(
                "An outbox job needs at least one channel",
                serde_json::json!({ "channels": "must not be empty" }),
            ));
        }

        let now = Utc::now().fixed_offset();
        let job_id = Uuid::new_v4();

        let job = ActiveModel {
            id: Set(job_id),
            invite_id: Set(new_job.invite_id),
            store_uid: Set(new_job.store_uid.clone()),
            channels: Set(serde_json::to_value(&new_job.channels)
                .map_err(|e| anyhow::anyhow!("Failed to serialize channels: {}", e))?),
            payload: Set(serde_json::to_value(&new_job.payload)
                .map_err(|e| anyhow::anyhow!("Failed to serialize payload: {}", e))?),
            status: Set("pending".to_string()),
            attempts: Set(0),
            next_attempt_at: Set(now),
            last_error: Set(None),
            locked_by: Set(None),
            locked_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        job.insert(&self.db).await.map_err(|e| {
            tracing::error!("Failed to enqueue outbox job: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to enqueue outbox job",
            )
        })?;

        tracing::info!(
            job_id = %job_id,
            invite_id = %new_job.invite_id,
            store_uid = %new_job.store_uid,
            "Outbox job enqueued"
        );

        Ok(job_id)
    }

    /// Lease a batch of due jobs for the given worker.
    ///
    /// A job is leasable when it is `pending`, due, and either unleased or
    /// holding a lease older than `lease_seconds`. Leased jobs keep the
    /// `pending` status; the lease itself is `locked_by`/`locked_at`, so a
    /// crashed worker's jobs become leasable again once the window passes.
    pub async fn lease_pending_jobs(
        &self,
        worker_id: &str,
        limit: u64,
        lease_seconds: i64,
    ) -> Result<Vec<Model>, ApiError> {
        let now = Utc::now().fixed_offset();
        let stale_before = now - Duration::seconds(lease_seconds);
        let txn = self.db.begin().await?;

        // First, find due jobs whose lease is free or stale
        let eligible_jobs = Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(
                Column::Status
                    .eq("pending")
                    .and(Column::NextAttemptAt.lte(now))
                    .and(
                        Column::LockedAt
                            .is_null()
                            .or(Column::LockedAt.lt(stale_before)),
                    ),
            )
            .order_by_asc(Column::NextAttemptAt)
            .limit(Some(limit))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        if eligible_jobs.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        // Atomically take the lease, re-checking the predicate so rows a
        // concurrent poller grabbed since the select fall out here
        let update_result = Entity::update_many()
            .col_expr(Column::LockedBy, Expr::value(worker_id))
            .col_expr(Column::LockedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.is_in(eligible_jobs))
            .filter(
                Column::Status
                    .eq("pending")
                    .and(Column::NextAttemptAt.lte(now))
                    .and(
                        Column::LockedAt
                            .is_null()
                            .or(Column::LockedAt.lt(stale_before)),
                    ),
            )
            .exec(&txn)
            .await?;

        // Fetch only the rows this update actually leased
        let claimed_jobs = if update_result.rows_affected > 0 {
            Entity::find()
                .filter(Column::LockedBy.eq(worker_id))
                .filter(Column::LockedAt.eq(now))
                .order_by_asc(Column::NextAttemptAt)
                .all(&txn)
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        Ok(claimed_jobs)
    }

    /// Record the outcome of a worker attempt and release the lease.
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        completion: JobCompletion,
    ) -> Result<Model, ApiError> {
        let job = Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                tracing::error!(job_id = %job_id, "Outbox job not found for completion");
                error::not_found("Outbox job not found")
            })?;

        let mut active_job: ActiveModel = job.into();
        active_job.status = Set(completion.status);
        active_job.attempts = Set(completion.attempts);
        if let Some(next) = completion.next_attempt_at {
            active_job.next_attempt_at = Set(next);
        }
        if let Some(err) = completion.last_error {
            active_job.last_error = Set(Some(err));
        }
        active_job.locked_by = Set(None);
        active_job.locked_at = Set(None);
        active_job.updated_at = Set(Utc::now().fixed_offset());

        let updated_job = active_job.update(&self.db).await.map_err(|e| {
            tracing::error!("Failed to complete outbox job: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to update outbox job",
            )
        })?;

        Ok(updated_job)
    }

    /// List outbox jobs for the admin API, newest first.
    pub async fn list_jobs(
        &self,
        status: Option<String>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Model>, ApiError> {
        let mut query = Entity::find().order_by_desc(Column::CreatedAt);

        if let Some(status_filter) = status {
            query = query.filter(Column::Status.eq(status_filter));
        }

        let results = query
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list outbox jobs: {}", e);
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to list outbox jobs",
                )
            })?;

        Ok(results)
    }
}
