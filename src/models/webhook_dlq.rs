//! WebhookDlq entity model
//!
//! This module contains the SeaORM entity model for the webhook_dlq table,
//! holding webhooks that exhausted their retry budget and now wait on an
//! operator decision.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// WebhookDlq entity representing a permanently parked webhook failure
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_dlq")]
pub struct Model {
    /// Unique identifier for the DLQ entry (primary key)
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

    /// Total failed processing attempts before promotion
    pub attempts: i32,

    /// Structured error details from the final failure
    #[sea_orm(column_type = "JsonBinary")]
    pub last_error: Option<JsonValue>,

    /// Timestamp of the first recorded failure
    pub first_failed_at: DateTimeWithTimeZone,

    /// Operator resolution state (unresolved, ignored, manual_fix)
    pub resolution: String,

    /// Operator who resolved the entry
    pub resolved_by: Option<String>,

    /// Timestamp the entry was resolved
    pub resolved_at: Option<DateTimeWithTimeZone>,

    /// Free-form operator notes attached at resolution
    pub resolution_notes: Option<String>,

    /// Timestamp when the entry was promoted into the DLQ
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
