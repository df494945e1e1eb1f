//! ProcessedEvent entity model
//!
//! Claim rows for at-most-once webhook processing. The primary key on
//! event_key is the claim primitive: the first transactional insert wins
//! and every later insert fails with a unique violation.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// ProcessedEvent entity representing one idempotency claim
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "processed_events")]
pub struct Model {
    /// The idempotency key (primary key); never updated, never deleted
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_key: String,

    /// Timestamp when the claim was taken
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
