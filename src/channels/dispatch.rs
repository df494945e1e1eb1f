//! # Multi-Channel Dispatch
//!
//! Sweeps the senders for one outbox job in order, applying the composite
//! send rate gates per channel. A channel blocked by the limiter records a
//! rate-limited attempt without contacting the provider.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::rate_limit::RateLimiter;

use super::{Channel, ChannelSender, JobPayload, SendContext, SendError};

/// How the dispatcher sweeps the requested channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// Attempt every requested channel.
    All,
    /// Stop at the first channel that delivers.
    FirstSuccess,
}

/// One channel attempt within a dispatch sweep.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChannelAttempt {
    pub channel: Channel,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SendError>,
}

/// Result of dispatching one job across its requested channels.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DispatchOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_success_channel: Option<Channel>,
    pub attempts: Vec<ChannelAttempt>,
}

/// Attempt delivery through the given senders in order.
pub async fn try_channels(
    senders: &[Arc<dyn ChannelSender>],
    payload: &JobPayload,
    ctx: &SendContext,
    strategy: DispatchStrategy,
    limiter: &RateLimiter,
) -> DispatchOutcome {
    let mut attempts = Vec::with_capacity(senders.len());
    let mut first_success_channel = None;

    for sender in senders {
        let channel = sender.channel();
        let admitted = match channel {
            Channel::Sms => limiter.can_send_sms(&ctx.store_uid),
            Channel::Email => limiter.can_send_email(&ctx.store_uid),
        };

        let result = if admitted {
            sender.send(payload, ctx).await
        } else {
            Err(SendError::rate_limited_with_message(
                None,
                "Send admission rejected by rate limiter",
            ))
        };

        let outcome_label = if result.is_ok() { "ok" } else { "failed" };
        let metric_labels = vec![
            ("channel", channel.as_str().to_string()),
            ("outcome", outcome_label.to_string()),
        ];
        counter!("channel_send_total", &metric_labels).increment(1);

        match result {
            Ok(()) => {
                debug!(
                    channel = channel.as_str(),
                    job_id = %ctx.job_id,
                    store_uid = %ctx.store_uid,
                    "Channel delivery succeeded"
                );
                attempts.push(ChannelAttempt {
                    channel,
                    ok: true,
                    error: None,
                });
                if first_success_channel.is_none() {
                    first_success_channel = Some(channel);
                }
                if strategy == DispatchStrategy::FirstSuccess {
                    break;
                }
            }
            Err(e) => {
                warn!(
                    channel = channel.as_str(),
                    job_id = %ctx.job_id,
                    store_uid = %ctx.store_uid,
                    error = %e,
                    "Channel delivery failed"
                );
                attempts.push(ChannelAttempt {
                    channel,
                    ok: false,
                    error: Some(e),
                });
            }
        }
    }

    DispatchOutcome {
        ok: first_success_channel.is_some(),
        first_success_channel,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::channels::SendErrorKind;
    use crate::config::{ChannelLimitConfig, SendLimitsConfig};

    struct StubSender {
        channel: Channel,
        result: Result<(), SendError>,
        calls: AtomicUsize,
    }

    impl StubSender {
        fn new(channel: Channel, result: Result<(), SendError>) -> Arc<Self> {
            Arc::new(Self {
                channel,
                result,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChannelSender for StubSender {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, _payload: &JobPayload, _ctx: &SendContext) -> Result<(), SendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn open_limiter() -> RateLimiter {
        RateLimiter::new(
            SendLimitsConfig::default(),
            "unifonic".to_string(),
            "resend".to_string(),
        )
    }

    fn sms_exhausted_limiter() -> RateLimiter {
        let closed = ChannelLimitConfig {
            global_capacity: 0.0,
            global_refill_per_sec: 0.0,
            store_capacity: 0.0,
            store_refill_per_sec: 0.0,
            provider_capacity: 0.0,
            provider_refill_per_sec: 0.0,
        };
        RateLimiter::new(
            SendLimitsConfig {
                sms: closed,
                email: ChannelLimitConfig::default(),
            },
            "unifonic".to_string(),
            "resend".to_string(),
        )
    }

    fn ctx() -> SendContext {
        SendContext {
            store_uid: "store-1".to_string(),
            job_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn first_success_stops_the_sweep() {
        let sms = StubSender::new(Channel::Sms, Ok(()));
        let email = StubSender::new(Channel::Email, Ok(()));
        let senders: Vec<Arc<dyn ChannelSender>> = vec![sms.clone(), email.clone()];

        let outcome = try_channels(
            &senders,
            &JobPayload::default(),
            &ctx(),
            DispatchStrategy::FirstSuccess,
            &open_limiter(),
        )
        .await;

        assert!(outcome.ok);
        assert_eq!(outcome.first_success_channel, Some(Channel::Sms));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(sms.call_count(), 1);
        assert_eq!(email.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_sms_falls_through_to_email() {
        let sms = StubSender::new(
            Channel::Sms,
            Err(SendError::transient("provider unreachable")),
        );
        let email = StubSender::new(Channel::Email, Ok(()));
        let senders: Vec<Arc<dyn ChannelSender>> = vec![sms.clone(), email.clone()];

        let outcome = try_channels(
            &senders,
            &JobPayload::default(),
            &ctx(),
            DispatchStrategy::FirstSuccess,
            &open_limiter(),
        )
        .await;

        assert!(outcome.ok);
        assert_eq!(outcome.first_success_channel, Some(Channel::Email));
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].ok);
        assert_eq!(
            outcome.attempts[0].error.as_ref().unwrap().kind,
            SendErrorKind::Transient
        );
        assert!(outcome.attempts[1].ok);
    }

    #[tokio::test]
    async fn all_strategy_attempts_every_channel() {
        let sms = StubSender::new(Channel::Sms, Ok(()));
        let email = StubSender::new(Channel::Email, Ok(()));
        let senders: Vec<Arc<dyn ChannelSender>> = vec![sms.clone(), email.clone()];

        let outcome = try_channels(
            &senders,
            &JobPayload::default(),
            &ctx(),
            DispatchStrategy::All,
            &open_limiter(),
        )
        .await;

        assert!(outcome.ok);
        assert_eq!(outcome.first_success_channel, Some(Channel::Sms));
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(sms.call_count(), 1);
        assert_eq!(email.call_count(), 1);
    }

    #[tokio::test]
    async fn rate_limited_channel_is_skipped_without_provider_contact() {
        let sms = StubSender::new(Channel::Sms, Ok(()));
        let email = StubSender::new(Channel::Email, Ok(()));
        let senders: Vec<Arc<dyn ChannelSender>> = vec![sms.clone(), email.clone()];

        let outcome = try_channels(
            &senders,
            &JobPayload::default(),
            &ctx(),
            DispatchStrategy::FirstSuccess,
            &sms_exhausted_limiter(),
        )
        .await;

        // SMS was blocked by the gate, email delivered.
        assert!(outcome.ok);
        assert_eq!(outcome.first_success_channel, Some(Channel::Email));
        assert_eq!(sms.call_count(), 0);
        assert_eq!(email.call_count(), 1);
        assert!(matches!(
            outcome.attempts[0].error.as_ref().unwrap().kind,
            SendErrorKind::RateLimited { .. }
        ));
    }

    #[tokio::test]
    async fn every_channel_failing_yields_not_ok() {
        let sms = StubSender::new(Channel::Sms, Err(SendError::transient("down")));
        let email = StubSender::new(Channel::Email, Err(SendError::permanent("bad address")));
        let senders: Vec<Arc<dyn ChannelSender>> = vec![sms, email];

        let outcome = try_channels(
            &senders,
            &JobPayload::default(),
            &ctx(),
            DispatchStrategy::FirstSuccess,
            &open_limiter(),
        )
        .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.first_success_channel, None);
        assert_eq!(outcome.attempts.len(), 2);
    }
}
