//! Test utilities for database testing.
//!
//! This module provides utilities for setting up in-memory SQLite databases
//! with migrations for testing purposes, plus fixture helpers for the
//! delivery pipeline tables.

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use mirsal::channels::{Channel, JobPayload};
use mirsal::config::AppConfig;
use mirsal::models::{outbox_job, review_invite};
use mirsal::repositories::{
    NewOutboxJob, NewReviewInvite, OutboxRepository, ReviewInviteRepository,
};
use sea_orm::{Database, DatabaseConnection, EntityTrait};
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Test configuration with auth material and a cheap worker tick.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec!["operator-token".to_string()],
        cron_secret: Some("cron-secret".to_string()),
        webhook_salla_secret: Some("salla-secret".to_string()),
        webhook_zid_token: Some("zid-token".to_string()),
        ..AppConfig::default()
    }
}

/// Inserts a review invite in the `created` state.
#[allow(dead_code)]
pub async fn seed_invite(
    db: &DatabaseConnection,
    store_uid: &str,
    order_id: &str,
) -> Result<review_invite::Model> {
    let repo = ReviewInviteRepository::new(db.clone());
    let invite = repo
        .insert_invite(NewReviewInvite {
            store_uid: store_uid.to_string(),
            order_id: order_id.to_string(),
            customer_name: Some("Sara Hassan".to_string()),
            phone: Some("+966500000001".to_string()),
            email: Some("sara@example.com".to_string()),
            review_url: format!("http://localhost:8080/r/{}/{}", store_uid, order_id),
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to seed invite: {:?}", e))?;
    Ok(invite)
}

/// Enqueues a due outbox job for the given invite and returns the row.
#[allow(dead_code)]
pub async fn seed_job(
    db: &DatabaseConnection,
    invite: &review_invite::Model,
    channels: Vec<Channel>,
) -> Result<outbox_job::Model> {
    let repo = OutboxRepository::new(db.clone());
    let job_id = repo
        .enqueue_invite_job(NewOutboxJob {
            invite_id: invite.id,
            store_uid: invite.store_uid.clone(),
            channels,
            payload: JobPayload {
                sms_text: Some(format!(
                    "Hi Sara, thanks for your order! We'd love your feedback: {}",
                    invite.review_url
                )),
                phone: invite.phone.clone(),
                email_html: Some(format!(
                    "<p>Hi Sara,</p><p><a href=\"{}\">Leave a review</a></p>",
                    invite.review_url
                )),
                email_to: invite.email.clone(),
                email_subject: Some("How was your order?".to_string()),
            },
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to seed outbox job: {:?}", e))?;

    let job = fetch_job(db, job_id).await?;
    Ok(job)
}

/// Reloads an outbox job row by ID.
#[allow(dead_code)]
pub async fn fetch_job(db: &DatabaseConnection, job_id: Uuid) -> Result<outbox_job::Model> {
    outbox_job::Entity::find_by_id(job_id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("outbox job {} not found", job_id))
}

/// Reloads a review invite row by ID.
#[allow(dead_code)]
pub async fn fetch_invite(
    db: &DatabaseConnection,
    invite_id: Uuid,
) -> Result<review_invite::Model> {
    review_invite::Entity::find_by_id(invite_id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("review invite {} not found", invite_id))
}
