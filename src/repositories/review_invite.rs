//! # Review Invite Repository
//!
//! Repository operations for the review_invites table, the business row a
//! completed-order webhook produces. Delivery status lives on the invite.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use crate::error::{self, ApiError};
use crate::models::review_invite::{ActiveModel, Entity, Model};

/// A new review invite extracted from an order event.
#[derive(Debug, Clone)]
pub struct NewReviewInvite {
    pub store_uid: String,
    pub order_id: String,
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub review_url: String,
}

/// Repository for review invite database operations
pub struct ReviewInviteRepository {
    db: DatabaseConnection,
}

impl ReviewInviteRepository {
    /// Create a new ReviewInviteRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a new invite in the `created` state.
    pub async fn insert_invite(&self, new_invite: NewReviewInvite) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let invite = ActiveModel {
            id: Set(Uuid::new_v4()),
            store_uid: Set(new_invite.store_uid),
            order_id: Set(new_invite.order_id),
            customer_name: Set(new_invite.customer_name),
            phone: Set(new_invite.phone),
            email: Set(new_invite.email),
            review_url: Set(new_invite.review_url),
            status: Set("created".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = invite.insert(&self.db).await.map_err(|e| {
            tracing::error!("Failed to insert review invite: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to insert review invite",
            )
        })?;

        tracing::info!(
            invite_id = %inserted.id,
            store_uid = %inserted.store_uid,
            order_id = %inserted.order_id,
            "Review invite created"
        );

        Ok(inserted)
    }

    /// Mark an invite as delivered on at least one channel.
    pub async fn mark_notified(&self, invite_id: Uuid) -> Result<Model, ApiError> {
        let invite = Entity::find_by_id(invite_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| error::not_found("Review invite not found"))?;

        let mut active_invite: ActiveModel = invite.into();
        active_invite.status = Set("notified".to_string());
        active_invite.updated_at = Set(Utc::now().fixed_offset());

        let updated = active_invite.update(&self.db).await.map_err(|e| {
            tracing::error!("Failed to mark review invite notified: {}", e);
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to mark review invite notified",
            )
        })?;

        Ok(updated)
    }
}
