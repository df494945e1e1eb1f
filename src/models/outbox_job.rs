//! OutboxJob entity model
//!
//! This module contains the SeaORM entity model for the outbox_jobs table,
//! which represents pending notification deliveries awaiting a worker.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// OutboxJob entity representing one deferred notification delivery
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_jobs")]
pub struct Model {
    /// Unique identifier for the job (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Review invite this job delivers for (logical reference, no FK)
    pub invite_id: Uuid,

    /// Store the invite belongs to
    pub store_uid: String,

    /// Ordered non-empty array of requested channels ("sms"/"email")
    #[sea_orm(column_type = "JsonBinary")]
    pub channels: JsonValue,

    /// Channel-specific message content
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Current status of the job (pending, ok, dead)
    pub status: String,

    /// Number of delivery attempts made so far
    pub attempts: i32,

    /// Timestamp when the job next becomes due
    pub next_attempt_at: DateTimeWithTimeZone,

    /// Structured error details from the most recent failed attempt
    #[sea_orm(column_type = "JsonBinary")]
    pub last_error: Option<JsonValue>,

    /// Worker currently holding the lease, if any
    pub locked_by: Option<String>,

    /// Timestamp the lease was taken; stale leases expire passively
    pub locked_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the job was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
