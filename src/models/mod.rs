//! # Data Models
//!
//! This module contains all the data models used throughout the mirsal
//! delivery service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod outbox_job;
pub mod processed_event;
pub mod review_invite;
pub mod webhook_dlq;
pub mod webhook_retry;

pub use outbox_job::Entity as OutboxJob;
pub use processed_event::Entity as ProcessedEvent;
pub use review_invite::Entity as ReviewInvite;
pub use webhook_dlq::Entity as WebhookDlq;
pub use webhook_retry::Entity as WebhookRetry;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "mirsal".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
