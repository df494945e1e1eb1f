//! # SMS Channel
//!
//! Delivers review invites over SMS through a JSON gateway API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::ChannelProvidersConfig;

use super::{Channel, ChannelSender, JobPayload, SendContext, SendError};

/// Sender for the SMS gateway configured in [`ChannelProvidersConfig`].
pub struct SmsSender {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    sender_name: String,
}

impl SmsSender {
    pub fn new(config: &ChannelProvidersConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url: config.sms_api_url.clone(),
            api_key: config.sms_api_key.clone(),
            sender_name: config.sms_sender_name.clone(),
        }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, payload: &JobPayload, ctx: &SendContext) -> Result<(), SendError> {
        let text = payload
            .sms_text
            .as_deref()
            .ok_or_else(|| SendError::permanent("Job payload has no smsText"))?;
        let phone = payload
            .phone
            .as_deref()
            .ok_or_else(|| SendError::permanent("Job payload has no phone"))?;

        let body = json!({
            "recipient": phone,
            "body": text,
            "sender": self.sender_name,
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
                        "SMS accepted by provider"
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
                        "SMS provider throttled the request",
                    ))
                } else if status.is_server_error() {
                    Err(SendError::transient(format!(
                        "SMS provider returned {}",
                        status
                    )))
                } else {
                    Err(SendError::permanent(format!(
                        "SMS provider returned {}",
                        status
                    )))
                }
            }
            Err(e) => Err(SendError::transient(format!("SMS request failed: {}", e))),
        }
    }
}
