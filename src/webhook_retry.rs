//! # Webhook Retry Processor
//!
//! Replays parked webhook deliveries. The cron-invoked pass scans due retry
//! entries and re-runs ingestion; a success deletes the entry, a failure
//! reschedules it with backoff, and an exhausted entry is promoted to the
//! dead letter queue. DLQ entries are terminal for the cron pass; they are
//! only re-processed through an operator's manual retry.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::{counter, gauge, histogram};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{self, ApiError};
use crate::handlers::webhooks::ingest_order_event;
use crate::models::webhook_dlq;
use crate::outbox_worker::compute_next_backoff_ms;
use crate::repositories::{WebhookDlqRepository, WebhookRetryRepository};

/// Counters for one retry queue pass.
#[derive(Debug, Default, Clone, Copy, Serialize, ToSchema)]
pub struct RetryRunStats {
    pub processed: u64,
    pub succeeded: u64,
    pub rescheduled: u64,
    pub promoted: u64,
}

/// Outcome of an operator-triggered DLQ replay.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManualRetryOutcome {
    pub dlq_id: Uuid,
    pub succeeded: bool,
    /// Error recorded on the entry when the replay failed again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonValue>,
}

/// Operational snapshot of the retry queue and DLQ.
#[derive(Debug, Serialize, ToSchema)]
pub struct RetrySystemHealth {
    /// Entries waiting in the retry queue, due or not.
    pub pending_retries: u64,
    /// Entries whose next retry time has passed.
    pub due_now: u64,
    /// Total dead letter queue size.
    pub dlq_depth: u64,
    /// DLQ entries no operator has resolved yet.
    pub unresolved_count: u64,
    /// Age of the oldest unresolved DLQ entry, if any.
    pub oldest_unresolved_age_seconds: Option<i64>,
}

/// Drives retries and DLQ operations for failed inbound webhooks.
pub struct WebhookRetryProcessor {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    retry_repo: WebhookRetryRepository,
    dlq_repo: WebhookDlqRepository,
}

impl WebhookRetryProcessor {
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        Self {
            retry_repo: WebhookRetryRepository::new(db.clone()),
            dlq_repo: WebhookDlqRepository::new(db.clone()),
            db,
            config,
        }
    }

    /// Run one pass over the due retry entries.
    ///
    /// Safe to invoke repeatedly or concurrently: re-ingestion converges on
    /// the per-order invite claim, and deleting an already deleted entry is
    /// a no-op.
    #[instrument(skip_all)]
    pub async fn process_retry_queue(&self, limit: u64) -> Result<RetryRunStats, ApiError> {
        let started = std::time::Instant::now();
        let mut stats = RetryRunStats::default();

        let due = self.retry_repo.due_entries(limit).await?;
        if due.is_empty() {
            return Ok(stats);
        }

        let max_attempts = self.config.retry_policy.max_attempts;

        for entry in due {
            stats.processed += 1;
            let metric_labels = vec![("platform", entry.platform.clone())];

            match ingest_order_event(&self.db, &self.config, &entry.platform, &entry.payload)
                .await
            {
                Ok(_) => {
                    self.retry_repo.delete_entry(entry.id).await?;
                    stats.succeeded += 1;
                    counter!("webhook_retry_succeeded_total", &metric_labels).increment(1);
                    info!(
                        retry_id = %entry.id,
                        platform = %entry.platform,
                        attempts = entry.attempts,
                        "Parked webhook reprocessed successfully"
                    );
                }
                Err(err) => {
                    let attempts = entry.attempts + 1;
                    let error_json = serde_json::to_value(&err).unwrap_or_default();

                    if attempts >= max_attempts {
                        self.dlq_repo.insert_from_retry(&entry, error_json).await?;
                        self.retry_repo.delete_entry(entry.id).await?;
                        stats.promoted += 1;
                        counter!("webhook_retry_promoted_total", &metric_labels).increment(1);
                        error!(
                            retry_id = %entry.id,
                            platform = %entry.platform,
                            attempts,
                            "Webhook retries exhausted, promoted to DLQ"
                        );
                    } else {
                        let next_retry_at = (Utc::now()
                            + Duration::milliseconds(compute_next_backoff_ms(entry.attempts)))
                        .fixed_offset();
                        self.retry_repo
                            .reschedule(entry.id, attempts, next_retry_at, error_json)
                            .await?;
                        stats.rescheduled += 1;
                        counter!("webhook_retry_rescheduled_total", &metric_labels).increment(1);
                        warn!(
                            retry_id = %entry.id,
                            platform = %entry.platform,
                            attempts,
                            error = %err.message,
                            "Webhook retry failed, rescheduled with backoff"
                        );
                    }
                }
            }
        }

        histogram!("webhook_retry_pass_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);
        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            rescheduled = stats.rescheduled,
            promoted = stats.promoted,
            "Webhook retry pass finished"
        );

        Ok(stats)
    }

    /// Replay one DLQ entry on an operator's request.
    ///
    /// A success resolves the entry as `manual_fix`; a failure records the
    /// error and leaves the entry unresolved so it can be retried again.
    pub async fn manual_retry_webhook(
        &self,
        dlq_id: Uuid,
        operator_id: &str,
    ) -> Result<ManualRetryOutcome, ApiError> {
        let entry = self.dlq_repo.find_by_id(dlq_id).await?;

        if entry.resolution != "unresolved" {
            return Err(error::conflict("DLQ entry is already resolved"));
        }

        match ingest_order_event(&self.db, &self.config, &entry.platform, &entry.payload).await {
            Ok(_) => {
                self.dlq_repo
                    .resolve(
                        dlq_id,
                        operator_id,
                        "manual_fix",
                        Some("Resolved via manual retry".to_string()),
                    )
                    .await?;
                let metric_labels = vec![("outcome", "ok".to_string())];
                counter!("webhook_dlq_manual_retry_total", &metric_labels).increment(1);
                info!(dlq_id = %dlq_id, operator_id, "DLQ entry replayed and resolved");
                Ok(ManualRetryOutcome {
                    dlq_id,
                    succeeded: true,
                    error: None,
                })
            }
            Err(err) => {
                let error_json = serde_json::to_value(&err).unwrap_or_default();
                self.dlq_repo
                    .record_failed_manual_retry(dlq_id, error_json.clone())
                    .await?;
                let metric_labels = vec![("outcome", "failed".to_string())];
                counter!("webhook_dlq_manual_retry_total", &metric_labels).increment(1);
                warn!(
                    dlq_id = %dlq_id,
                    operator_id,
                    error = %err.message,
                    "Manual DLQ replay failed, entry stays unresolved"
                );
                Ok(ManualRetryOutcome {
                    dlq_id,
                    succeeded: false,
                    error: Some(error_json),
                })
            }
        }
    }

    /// Close a DLQ entry without reprocessing it.
    pub async fn resolve_dlq_entry(
        &self,
        dlq_id: Uuid,
        operator_id: &str,
        resolution: &str,
        notes: Option<String>,
    ) -> Result<webhook_dlq::Model, ApiError> {
        self.dlq_repo
            .resolve(dlq_id, operator_id, resolution, notes)
            .await
    }

    /// Queue and DLQ gauges for operators watching the pipeline fall behind.
    pub async fn check_retry_system_health(&self) -> Result<RetrySystemHealth, ApiError> {
        let pending_retries = self.retry_repo.count_pending().await?;
        let due_now = self.retry_repo.count_due_now().await?;
        let dlq_depth = self.dlq_repo.dlq_depth().await?;
        let unresolved_count = self.dlq_repo.unresolved_count().await?;
        let oldest_unresolved_age_seconds =
            self.dlq_repo.oldest_unresolved_age_seconds().await?;

        gauge!("webhook_retry_pending").set(pending_retries as f64);
        gauge!("webhook_retry_due").set(due_now as f64);
        gauge!("webhook_dlq_depth").set(dlq_depth as f64);
        gauge!("webhook_dlq_unresolved").set(unresolved_count as f64);

        Ok(RetrySystemHealth {
            pending_retries,
            due_now,
            dlq_depth,
            unresolved_count,
            oldest_unresolved_age_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use migration::{Migrator, MigratorTrait};
    use sea_orm::EntityTrait;
    use serde_json::json;

    use crate::db::init_pool;
    use crate::models::{review_invite, webhook_retry};
    use crate::repositories::NewWebhookRetry;

    async fn setup() -> (Arc<AppConfig>, DatabaseConnection, WebhookRetryProcessor) {
        let config = Arc::new(AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            ..Default::default()
        });
        let db = init_pool(&config).await.expect("Failed to init test DB");
        Migrator::up(&db, None).await.unwrap();

        let processor = WebhookRetryProcessor::new(config.clone(), db.clone());
        (config, db, processor)
    }

    fn due_entry(payload: JsonValue) -> NewWebhookRetry {
        NewWebhookRetry {
            platform: "salla".to_string(),
            event_key: format!("test-key-{}", Uuid::new_v4()),
            payload,
            headers: json!({}),
            error: json!({ "message": "boom" }),
            next_retry_at: (Utc::now() - Duration::seconds(5)).fixed_offset(),
        }
    }

    fn replayable_order(order_id: i64) -> JsonValue {
        json!({
            "event": "order.completed",
            "merchant": 42,
            "data": {
                "id": order_id,
                "customer": { "first_name": "Sara", "mobile": "+966500000001" }
            }
        })
    }

    // A handled event type with no customer contact fails ingestion every
    // time, which exercises the reschedule and promotion paths.
    fn poisoned_order(order_id: i64) -> JsonValue {
        json!({
            "event": "order.completed",
            "merchant": 42,
            "data": { "id": order_id, "customer": {} }
        })
    }

    #[tokio::test]
    async fn test_successful_replay_deletes_entry_and_creates_invite() {
        let (_config, db, processor) = setup().await;
        let retry_repo = WebhookRetryRepository::new(db.clone());

        retry_repo
            .insert_entry(due_entry(replayable_order(100)))
            .await
            .unwrap();

        let stats = processor.process_retry_queue(10).await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.rescheduled, 0);

        let remaining = webhook_retry::Entity::find().all(&db).await.unwrap();
        assert!(remaining.is_empty());

        let invites = review_invite::Entity::find().all(&db).await.unwrap();
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].order_id, "100");
    }

    #[tokio::test]
    async fn test_failed_replay_reschedules_with_backoff() {
        let (_config, db, processor) = setup().await;
        let retry_repo = WebhookRetryRepository::new(db.clone());

        let inserted = retry_repo
            .insert_entry(due_entry(poisoned_order(101)))
            .await
            .unwrap();
        assert_eq!(inserted.attempts, 1);

        let before = Utc::now().fixed_offset();
        let stats = processor.process_retry_queue(10).await.unwrap();
        assert_eq!(stats.rescheduled, 1);
        assert_eq!(stats.promoted, 0);

        let entry = webhook_retry::Entity::find_by_id(inserted.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.attempts, 2);
        // Prior failure count 1 means a two minute delay.
        let delay = (entry.next_retry_at - before).num_seconds();
        assert!((115..=125).contains(&delay), "delay was {}s", delay);
    }

    #[tokio::test]
    async fn test_exhausted_entry_is_promoted_to_dlq() {
        let (config, db, processor) = setup().await;
        let retry_repo = WebhookRetryRepository::new(db.clone());

        let inserted = retry_repo
            .insert_entry(due_entry(poisoned_order(102)))
            .await
            .unwrap();

        // Put the entry one failure away from exhaustion.
        retry_repo
            .reschedule(
                inserted.id,
                config.retry_policy.max_attempts - 1,
                (Utc::now() - Duration::seconds(1)).fixed_offset(),
                json!({ "message": "still failing" }),
            )
            .await
            .unwrap();

        let stats = processor.process_retry_queue(10).await.unwrap();
        assert_eq!(stats.promoted, 1);

        let remaining = webhook_retry::Entity::find().all(&db).await.unwrap();
        assert!(remaining.is_empty());

        let dlq = webhook_dlq::Entity::find().all(&db).await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].platform, "salla");
        assert_eq!(dlq[0].resolution, "unresolved");
        assert_eq!(dlq[0].payload["data"]["id"], 102);
    }

    #[tokio::test]
    async fn test_dlq_entries_are_ignored_by_the_cron_pass() {
        let (_config, db, processor) = setup().await;
        let dlq_repo = WebhookDlqRepository::new(db.clone());
        let retry_repo = WebhookRetryRepository::new(db.clone());

        // Park an entry directly in the DLQ.
        let parked = retry_repo
            .insert_entry(due_entry(replayable_order(103)))
            .await
            .unwrap();
        dlq_repo
            .insert_from_retry(&parked, json!({ "message": "exhausted" }))
            .await
            .unwrap();
        retry_repo.delete_entry(parked.id).await.unwrap();

        let stats = processor.process_retry_queue(10).await.unwrap();
        assert_eq!(stats.processed, 0);

        // The DLQ entry is untouched and no invite was created.
        let dlq = webhook_dlq::Entity::find().all(&db).await.unwrap();
        assert_eq!(dlq.len(), 1);
        let invites = review_invite::Entity::find().all(&db).await.unwrap();
        assert!(invites.is_empty());
    }

    #[tokio::test]
    async fn test_manual_retry_resolves_entry_on_success() {
        let (_config, db, processor) = setup().await;
        let dlq_repo = WebhookDlqRepository::new(db.clone());
        let retry_repo = WebhookRetryRepository::new(db.clone());

        let parked = retry_repo
            .insert_entry(due_entry(replayable_order(104)))
            .await
            .unwrap();
        let dlq_entry = dlq_repo
            .insert_from_retry(&parked, json!({ "message": "exhausted" }))
            .await
            .unwrap();
        retry_repo.delete_entry(parked.id).await.unwrap();

        let outcome = processor
            .manual_retry_webhook(dlq_entry.id, "ops@example.com")
            .await
            .unwrap();
        assert!(outcome.succeeded);

        let resolved = webhook_dlq::Entity::find_by_id(dlq_entry.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.resolution, "manual_fix");
        assert_eq!(resolved.resolved_by.as_deref(), Some("ops@example.com"));
        assert!(resolved.resolved_at.is_some());

        let invites = review_invite::Entity::find().all(&db).await.unwrap();
        assert_eq!(invites.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_retry_failure_leaves_entry_unresolved() {
        let (_config, db, processor) = setup().await;
        let dlq_repo = WebhookDlqRepository::new(db.clone());
        let retry_repo = WebhookRetryRepository::new(db.clone());

        let parked = retry_repo
            .insert_entry(due_entry(poisoned_order(105)))
            .await
            .unwrap();
        let dlq_entry = dlq_repo
            .insert_from_retry(&parked, json!({ "message": "exhausted" }))
            .await
            .unwrap();

        let outcome = processor
            .manual_retry_webhook(dlq_entry.id, "ops@example.com")
            .await
            .unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.error.is_some());

        let entry = webhook_dlq::Entity::find_by_id(dlq_entry.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.resolution, "unresolved");
        assert!(entry.last_error.is_some());
    }

    #[tokio::test]
    async fn test_manual_retry_on_resolved_entry_is_a_conflict() {
        let (_config, db, processor) = setup().await;
        let dlq_repo = WebhookDlqRepository::new(db.clone());
        let retry_repo = WebhookRetryRepository::new(db.clone());

        let parked = retry_repo
            .insert_entry(due_entry(replayable_order(106)))
            .await
            .unwrap();
        let dlq_entry = dlq_repo
            .insert_from_retry(&parked, json!({ "message": "exhausted" }))
            .await
            .unwrap();
        dlq_repo
            .resolve(dlq_entry.id, "ops@example.com", "ignored", None)
            .await
            .unwrap();

        let err = processor
            .manual_retry_webhook(dlq_entry.id, "ops@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.code.as_ref(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_health_snapshot_counts() {
        let (_config, db, processor) = setup().await;
        let retry_repo = WebhookRetryRepository::new(db.clone());
        let dlq_repo = WebhookDlqRepository::new(db.clone());

        // One due entry, one scheduled for later.
        retry_repo
            .insert_entry(due_entry(poisoned_order(107)))
            .await
            .unwrap();
        let mut future_entry = due_entry(poisoned_order(108));
        future_entry.next_retry_at = (Utc::now() + Duration::minutes(30)).fixed_offset();
        let parked = retry_repo.insert_entry(future_entry).await.unwrap();

        dlq_repo
            .insert_from_retry(&parked, json!({ "message": "exhausted" }))
            .await
            .unwrap();

        let health = processor.check_retry_system_health().await.unwrap();
        assert_eq!(health.pending_retries, 2);
        assert_eq!(health.due_now, 1);
        assert_eq!(health.dlq_depth, 1);
        assert_eq!(health.unresolved_count, 1);
        assert!(health.oldest_unresolved_age_seconds.is_some());
    }
}
