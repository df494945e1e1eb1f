//! # Notification Channels
//!
//! Outbound delivery channels for review invites. Each channel wraps one
//! provider HTTP API behind the [`ChannelSender`] trait; the dispatcher in
//! [`dispatch`] sweeps the requested channels under the send rate gates.

pub mod dispatch;
pub mod email;
pub mod sms;

pub use dispatch::{try_channels, ChannelAttempt, DispatchOutcome, DispatchStrategy};
pub use email::EmailSender;
pub use sms::SmsSender;

use async_trait::async_trait;
use uuid::Uuid;

/// Delivery channel enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
}

impl Channel {
    /// Create a Channel from a string slug as stored on an outbox job
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.to_lowercase().as_str() {
            "sms" => Some(Channel::Sms),
            "email" => Some(Channel::Email),
            _ => None,
        }
    }

    /// Get the string representation of the channel
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Email => "email",
        }
    }
}

/// Message content for one outbox job, with per-channel fields.
///
/// Senders consult only the fields for their own channel; a requested
/// channel whose fields are absent is a caller error.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_subject: Option<String>,
}

/// Context accompanying a send attempt, for rate scoping and logging.
#[derive(Debug, Clone)]
pub struct SendContext {
    pub store_uid: String,
    pub job_id: Uuid,
}

/// Send-specific error types for structured error handling during dispatch
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SendError {
    #[serde(flatten)]
    pub kind: SendErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SendErrorKind {
    /// Provider rejected for rate, with optional retry after hint
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Transient/retryable failure (network, provider 5xx)
    Transient,
    /// Permanent/non-retryable failure (bad payload, provider 4xx)
    Permanent,
}

impl SendError {
    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: SendErrorKind::RateLimited { retry_after_secs },
            message: None,
            details: None,
        }
    }

    pub fn rate_limited_with_message<S: Into<String>>(
        retry_after_secs: Option<u64>,
        message: S,
    ) -> Self {
        Self {
            kind: SendErrorKind::RateLimited { retry_after_secs },
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SendErrorKind::Transient,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SendErrorKind::Permanent,
            message: Some(message.into()),
            details: None,
        }
    }
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SendErrorKind::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(after) = retry_after_secs {
                    write!(f, " (retry after: {}s)", after)?;
                }
            }
            SendErrorKind::Transient => write!(f, "Transient error")?,
            SendErrorKind::Permanent => write!(f, "Permanent error")?,
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for SendError {}

/// Trait for channel sender implementations
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Which channel this sender delivers on
    fn channel(&self) -> Channel;

    /// Deliver one message for an outbox job
    async fn send(&self, payload: &JobPayload, ctx: &SendContext) -> Result<(), SendError>;
}
