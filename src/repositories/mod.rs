//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for the outbox
//! queue, the webhook retry pipeline, and review invites.

pub mod outbox;
pub mod review_invite;
pub mod webhook_dlq;
pub mod webhook_retry;

pub use outbox::{JobCompletion, NewOutboxJob, OutboxRepository};
pub use review_invite::{NewReviewInvite, ReviewInviteRepository};
pub use webhook_dlq::WebhookDlqRepository;
pub use webhook_retry::{NewWebhookRetry, WebhookRetryRepository};
