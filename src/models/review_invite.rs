//! ReviewInvite entity model
//!
//! This module contains the SeaORM entity model for the review_invites
//! table, the business row produced when a completed order webhook is
//! accepted. Delivery status is tracked on the invite itself.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// ReviewInvite entity representing one review invitation for an order
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "review_invites")]
pub struct Model {
    /// Unique identifier for the invite (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Store the order belongs to
    pub store_uid: String,

    /// Platform order identifier; unique together with store_uid
    pub order_id: String,

    /// Customer display name, when the platform provided one
    pub customer_name: Option<String>,

    /// Customer phone number for SMS delivery
    pub phone: Option<String>,

    /// Customer email address for email delivery
    pub email: Option<String>,

    /// Public URL the customer visits to leave the review
    pub review_url: String,

    /// Invite lifecycle status (created, notified)
    pub status: String,

    /// Timestamp when the invite was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the invite was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
