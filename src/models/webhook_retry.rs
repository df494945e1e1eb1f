//! WebhookRetry entity model
//!
//! This module contains the SeaORM entity model for the webhook_retries
//! table, the queue of inbound webhooks whose processing failed after
//! signature verification.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// WebhookRetry entity representing a failed inbound webhook awaiting replay
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_retries")]
pub struct Model {
    /// Unique identifier for the retry entry (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Source platform ("salla" or "zid")
    pub platform: String,

    /// Idempotency key derived for the original event
    pub event_key: String,

    /// Original webhook body
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Relevant request headers captured at receipt
    #[sea_orm(column_type = "JsonBinary")]
    pub headers: JsonValue,

    /// Number of failed processing attempts
    pub attempts: i32,

    /// Timestamp when the entry next becomes due for replay
    pub next_retry_at: DateTimeWithTimeZone,

    /// Structured error details from the most recent failure
    #[sea_orm(column_type = "JsonBinary")]
    pub last_error: Option<JsonValue>,

    /// Timestamp when the entry was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the entry was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
