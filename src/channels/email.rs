//! # Email Channel
//!
//! Delivers review invites over email through a JSON API (Resend-compatible).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::ChannelProvidersConfig;

use super::{Channel, ChannelSender, JobPayload, SendContext, SendError};

/// Sender for the email API configured in [`ChannelProvidersConfig`].
pub struct EmailSender {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    from_address: String,
}

impl EmailSender {
    pub fn new(config: &ChannelProvidersConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url: config.email_api_url.clone(),
            api_key: config.email_api_key.clone(),
            from_address: config.email_from.clone(),
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, payload: &JobPayload, ctx: &SendContext) -> Result<(), SendError> {
        let to = payload
            .email_to
            .as_deref()
            .ok_or_else(|| SendError::permanent("Job payload has no emailTo"))?;
        let html = payload
            .email_html
            .as_deref()
            .ok_or_else(|| SendError::permanent("Job payload has no emailHtml"))?;
        let subject = payload
            .email_subject
            .as_deref()
            .ok_or_else(|| SendError::permanent("Job payload has no emailSubject"))?;

        let body = json!({
            "from": self.from_address,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!(
                        job_id = %ctx.job_id,
                        store_uid = %ctx.store_uid,
                        "Email accepted by provider"
                    );
                    Ok(())
                } else if status.as_u16() == 429 {
                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|v| v.parse().ok());
                    Err(SendError::rate_limited_with_message(
                        retry_after,
                        "Email provider throttled the request",
                    ))
                } else if status.is_server_error() {
                    Err(SendError::transient(format!(
                        "Email provider returned {}",
                        status
                    )))
                } else {
                    Err(SendError::permanent(format!(
                        "Email provider returned {}",
                        status
                    )))
                }
            }
            Err(e) => Err(SendError::transient(format!(
                "Email request failed: {}",
                e
            ))),
        }
    }
}
