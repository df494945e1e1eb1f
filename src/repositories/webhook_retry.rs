//! # Webhook Retry Repository
//!
//! Repository operations for the webhook_retries table: the queue of
//! inbound webhooks whose processing failed after signature verification.
//! Entries wait here between scheduled replays until one succeeds or the
//! attempt budget runs out and the entry moves to the dead letter queue.

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{self, ApiError};
use crate::models::webhook_retry::{ActiveModel, Column, Entity, Model};

/// A webhook whose first processing attempt just failed.
///
/// The inline failure counts as attempt one; `next_retry_at` is the first
/// scheduled replay.
#[derive(Debug, Clone)]
pub struct NewWebhookRetry {
    pub platform: String,
    pub event_key: String,
    pub payload: JsonValue,
    pub headers: JsonValue,
    pub error: JsonValue,
    pub next_retry_at: DateTimeWithTimeZone,
}

/// Repository for webhook retry queue database operations
pub struct WebhookRetryRepository {
    db: DatabaseConnection,
}

impl WebhookRetryRepository {
    /// Create a new WebhookRetryRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Park a freshly failed webhook in the retry queue.
    pub async fn insert_entry(&self, entry: NewWebhookRetry) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let retry = ActiveModel {
            id: Set(Uuid::new_v4()),
            platform: Set(entry.platform),
            event_key: Set(entry.event_key),
            payload: Set(entry.payload),
            headers: Set(entry.headers),
            attempts: Set(1),
            next_retry_at: Set(entry.next_retry_at),
            last_error: Set(Some(entry.error)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = retry.insert(&self.db).await.map_err(|e| {
            tracing::error!("Failed to insert webhook retry entry: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to insert webhook retry entry",
            )
        })?;

        tracing::info!(
            retry_id = %inserted.id,
            platform = %inserted.platform,
            event_key = %inserted.event_key,
            "Webhook parked in retry queue"
        );

        Ok(inserted)
    }

    /// Fetch entries due for replay, oldest deadline first.
    pub async fn due_entries(&self, limit: u64) -> Result<Vec<Model>, ApiError> {
        let now = Utc::now().fixed_offset();

        let entries = Entity::find()
            .filter(Column::NextRetryAt.lte(now))
            .order_by_asc(Column::NextRetryAt)
            .limit(Some(limit))
            .all(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch due webhook retries: {}", e);
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to fetch due webhook retries",
                )
            })?;

        Ok(entries)
    }

    /// Remove an entry after its replay succeeded or after DLQ promotion.
    pub async fn delete_entry(&self, retry_id: Uuid) -> Result<(), ApiError> {
        Entity::delete_by_id(retry_id)
            .exec(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete webhook retry entry: {}", e);
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to delete webhook retry entry",
                )
            })?;

        Ok(())
    }

    /// Push an entry's deadline out after another failed replay.
    pub async fn reschedule(
        &self,
        retry_id: Uuid,
        attempts: i32,
        next_retry_at: DateTimeWithTimeZone,
        error: JsonValue,
    ) -> Result<Model, ApiError> {
        let entry = Entity::find_by_id(retry_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| error::not_found("Webhook retry entry not found"))?;

        let mut active_entry: ActiveModel = entry.into();
        active_entry.attempts = Set(attempts);
        active_entry.next_retry_at = Set(next_retry_at);
        active_entry.last_error = Set(Some(error));
        active_entry.updated_at = Set(Utc::now().fixed_offset());

        let updated = active_entry.update(&self.db).await.map_err(|e| {
            tracing::error!("Failed to reschedule webhook retry entry: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to reschedule webhook retry entry",
            )
        })?;

        Ok(updated)
    }

    /// Total entries waiting in the retry queue.
    pub async fn count_pending(&self) -> Result<u64, ApiError> {
        let total = Entity::find().count(&self.db).await.map_err(|e| {
            tracing::error!("Failed to count webhook retries: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to count webhook retries",
            )
        })?;

        Ok(total)
    }

    /// Entries already past their replay deadline.
    pub async fn count_due_now(&self) -> Result<u64, ApiError> {
        let now = Utc::now().fixed_offset();

        let due = Entity::find()
            .filter(Column::NextRetryAt.lte(now))
            .count(&self.db)
            .await
            .map_err(|e| {
                tracing::error!("Failed to count due webhook retries: {}", e);
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to count due webhook retries",
                )
            })?;

        Ok(due)
    }
}
