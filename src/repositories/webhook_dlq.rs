//! # Webhook DLQ Repository
//!
//! Repository operations for the webhook_dlq table. Entries land here when
//! a webhook exhausts its retry budget and leave only through an operator
//! decision: a manual retry that succeeds, or an explicit resolution.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{self, ApiError};
use crate::models::webhook_dlq::{ActiveModel, Column, Entity, Model};
use crate::models::webhook_retry;

const RESOLUTION_UNRESOLVED: &str = "unresolved";

/// Repository for dead letter queue database operations
pub struct WebhookDlqRepository {
    db: DatabaseConnection,
}

impl WebhookDlqRepository {
    /// Create a new WebhookDlqRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Promote an exhausted retry entry into the DLQ.
    ///
    /// Payload and headers carry over untouched so a manual retry can replay
    /// the original request; `first_failed_at` keeps the retry entry's
    /// creation time as the start of the failure window.
    pub async fn insert_from_retry(
        &self,
        retry: &webhook_retry::Model,
        final_error: JsonValue,
    ) -> Result<Model, ApiError> {
        let dlq_entry = ActiveModel {
            id: Set(Uuid::new_v4()),
            platform: Set(retry.platform.clone()),
            event_key: Set(retry.event_key.clone()),
            payload: Set(retry.payload.clone()),
            headers: Set(retry.headers.clone()),
            attempts: Set(retry.attempts),
            last_error: Set(Some(final_error)),
            first_failed_at: Set(retry.created_at),
            resolution: Set(RESOLUTION_UNRESOLVED.to_string()),
            resolved_by: Set(None),
            resolved_at: Set(None),
            resolution_notes: Set(None),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let inserted = dlq_entry.insert(&self.db).await.map_err(|e| {
            tracing::error!("Failed to insert DLQ entry: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to insert DLQ entry",
            )
        })?;

        tracing::warn!(
            dlq_id = %inserted.id,
            platform = %inserted.platform,
            event_key = %inserted.event_key,
            attempts = inserted.attempts,
            "Webhook moved to dead letter queue"
        );

        Ok(inserted)
    }

    /// Look up a single DLQ entry.
    pub async fn find_by_id(&self, dlq_id: Uuid) -> Result<Model, ApiError> {
        Entity::find_by_id(dlq_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| error::not_found("DLQ entry not found"))
    }

    /// List DLQ entries, newest first, with cursor pagination.
    ///
    /// The cursor is the id of the last entry from the previous page;
    /// ordering is (created_at, id) descending so pages stay stable while
    /// new entries arrive.
    pub async fn list(
        &self,
        limit: u64,
        start_after: Option<Uuid>,
        only_unreviewed: bool,
    ) -> Result<Vec<Model>, ApiError> {
        let mut query = Entity::find();

        if only_unreviewed {
            query = query.filter(Column::Resolution.eq(RESOLUTION_UNRESOLVED));
        }

        if let Some(cursor_id) = start_after {
            let cursor = self.find_by_id(cursor_id).await?;
            query = query.filter(
                Condition::any()
                    .add(Column::CreatedAt.lt(cursor.created_at))
                    .add(
                        Condition::all()
                            .add(Column::CreatedAt.eq(cursor.created_at))
                            .add(Column::Id.lt(cursor.id)),
                    ),
            );
        }

        let entries = query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .limit(Some(limit))
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list DLQ entries: {}", e);
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to list DLQ entries",
                )
            })?;

        Ok(entries)
    }

    /// Close an entry with an operator decision.
    ///
    /// Accepts only `ignored` and `manual_fix`; an already resolved entry
    /// stays as the first operator left it.
    pub async fn resolve(
        &self,
        dlq_id: Uuid,
        operator_id: &str,
        resolution: &str,
        notes: Option<String>,
    ) -> Result<Model, ApiError> {
        if resolution != "ignored" && resolution != "manual_fix" {
            return Err(error::validation_error(
                "Invalid resolution",
                serde_json::json!({ "resolution": "must be one of: ignored, manual_fix" }),
            ));
        }

        let entry = self.find_by_id(dlq_id).await?;
        if entry.resolution != RESOLUTION_UNRESOLVED {
            return Err(error::conflict("DLQ entry is already resolved"));
        }

        let mut active_entry: ActiveModel = entry.into();
        active_entry.resolution = Set(resolution.to_string());
        active_entry.resolved_by = Set(Some(operator_id.to_string()));
        active_entry.resolved_at = Set(Some(Utc::now().fixed_offset()));
        active_entry.resolution_notes = Set(notes);

        let updated = active_entry.update(&self.db).await.map_err(|e| {
            tracing::error!("Failed to resolve DLQ entry: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to resolve DLQ entry",
            )
        })?;

        tracing::info!(
            dlq_id = %updated.id,
            resolution = %updated.resolution,
            resolved_by = %operator_id,
            "DLQ entry resolved"
        );

        Ok(updated)
    }

    /// Record the error from a failed manual retry; the entry stays
    /// unresolved.
    pub async fn record_failed_manual_retry(
        &self,
        dlq_id: Uuid,
        error_details: JsonValue,
    ) -> Result<Model, ApiError> {
        let entry = self.find_by_id(dlq_id).await?;

        let mut active_entry: ActiveModel = entry.into();
        active_entry.last_error = Set(Some(error_details));

        let updated = active_entry.update(&self.db).await.map_err(|e| {
            tracing::error!("Failed to record manual retry error: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to record manual retry error",
            )
        })?;

        Ok(updated)
    }

    /// Total entries in the DLQ.
    pub async fn dlq_depth(&self) -> Result<u64, ApiError> {
        let total = Entity::find().count(&self.db).await.map_err(|e| {
            tracing::error!("Failed to count DLQ entries: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to count DLQ entries",
            )
        })?;

        Ok(total)
    }

    /// Entries still awaiting an operator decision.
    pub async fn unresolved_count(&self) -> Result<u64, ApiError> {
        let unresolved = Entity::find()
            .filter(Column::Resolution.eq(RESOLUTION_UNRESOLVED))
            .count(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to count unresolved DLQ entries: {}", e);
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to count unresolved DLQ entries",
                )
            })?;

        Ok(unresolved)
    }

    /// Age in seconds of the oldest unresolved entry, if any.
    pub async fn oldest_unresolved_age_seconds(&self) -> Result<Option<i64>, ApiError> {
        let oldest = Entity::find()
            .filter(Column::Resolution.eq(RESOLUTION_UNRESOLVED))
            .order_by_asc(Column::CreatedAt)
            .one(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find oldest unresolved DLQ entry: {}", e);
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to find oldest unresolved DLQ entry",
                )
            })?;

        let age = oldest.map(|entry| {
            (Utc::now().fixed_offset() - entry.created_at)
                .num_seconds()
                .max(0)
        });

        Ok(age)
    }
}
