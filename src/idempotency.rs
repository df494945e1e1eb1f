//! # Idempotency Guard
//!
//! At-most-once processing for webhook events and invite creation. A claim
//! is a transactional insert into processed_events; the unique primary key
//! makes the first insert win and every duplicate fail, which gives
//! linearizable claim semantics per key without advisory locks.

use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use sha2::{Digest, Sha256};

use crate::error::{ApiError, is_unique_violation};
use crate::models::processed_event;

/// Outcome of running a closure under an idempotency claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome<T> {
    /// This caller won the claim and the closure ran.
    Executed(T),
    /// Another caller already claimed the key; the closure never ran.
    Skipped,
}

impl<T> EventOutcome<T> {
    /// Whether the closure was executed by this caller.
    pub fn is_executed(&self) -> bool {
        matches!(self, EventOutcome::Executed(_))
    }

    /// Unwrap the executed value, if any.
    pub fn into_executed(self) -> Option<T> {
        match self {
            EventOutcome::Executed(value) => Some(value),
            EventOutcome::Skipped => None,
        }
    }
}

/// Attempt to claim `event_key`. Returns `true` when this caller took the
/// claim, `false` when the key was already claimed.
pub async fn claim_event(db: &DatabaseConnection, event_key: &str) -> Result<bool, ApiError> {
    let txn = db.begin().await?;

    let claim = processed_event::ActiveModel {
        event_key: Set(event_key.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    };

    match claim.insert(&txn).await {
        Ok(_) => {
            txn.commit().await?;
            Ok(true)
        }
        Err(err) if is_unique_violation(&err) => {
            counter!("idempotency_duplicates_total").increment(1);
            tracing::debug!(event_key = %event_key, "Duplicate event skipped");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// Run `run` at most once for `event_key`.
///
/// The claim commits before `run` executes, so a failure inside `run` does
/// not release the key: this is at-most-once processing, and callers that
/// need recovery must park their own retry state (the webhook retry queue
/// derives a fresh key per delivery for exactly this reason).
pub async fn with_event_once<F, Fut, T>(
    db: &DatabaseConnection,
    event_key: &str,
    run: F,
) -> Result<EventOutcome<T>, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if !claim_event(db, event_key).await? {
        return Ok(EventOutcome::Skipped);
    }

    let value = run().await?;
    Ok(EventOutcome::Executed(value))
}

/// Claim the invite key for (store_uid, order_id). Returns `true` on the
/// first claim and `false` for duplicates.
pub async fn ensure_single_invite_key(
    db: &DatabaseConnection,
    store_uid: &str,
    order_id: &str,
) -> Result<bool, ApiError> {
    claim_event(db, &invite_event_key(store_uid, order_id)).await
}

/// Composite idempotency key guarding one invite per order.
pub fn invite_event_key(store_uid: &str, order_id: &str) -> String {
    format!("invite:{}:{}", store_uid, order_id)
}

/// Derive the idempotency key for an inbound webhook delivery as a SHA-256
/// hex digest over platform, signature, and raw body.
pub fn event_key_for_webhook(platform: &str, signature: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform.as_bytes());
    hasher.update(signature.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}
