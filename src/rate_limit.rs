//! # Send Rate Limiting
//!
//! Token bucket admission for outbound channel sends (global, per-store and
//! per-provider scopes) plus a sliding-window limiter for the public webhook
//! routes. Both limiters are built once at startup and shared through
//! application state; nothing in this module is process-global.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::{debug, warn};

use crate::config::{AppConfig, ChannelLimitConfig, SendLimitsConfig};
use crate::error::ApiError;

/// A single token bucket. Refill happens lazily on access.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// The three admission scopes for one outbound send, outermost first.
fn send_scopes(
    channel: &str,
    store_uid: &str,
    provider_slug: &str,
    limits: &ChannelLimitConfig,
) -> [(String, f64, f64); 3] {
    [
        (
            format!("{}:global", channel),
            limits.global_capacity,
            limits.global_refill_per_sec,
        ),
        (
            format!("{}:store:{}", channel, store_uid),
            limits.store_capacity,
            limits.store_refill_per_sec,
        ),
        (
            format!("{}:provider:{}", channel, provider_slug),
            limits.provider_capacity,
            limits.provider_refill_per_sec,
        ),
    ]
}

/// Token bucket rate limiter keyed by scope string.
///
/// An outbound send must pass every scope that applies to it; the composite
/// gates deduct from all scopes or from none, so a rejection never leaves a
/// half-spent budget behind.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    limits: SendLimitsConfig,
    sms_provider_slug: String,
    email_provider_slug: String,
}

impl RateLimiter {
    pub fn new(
        limits: SendLimitsConfig,
        sms_provider_slug: String,
        email_provider_slug: String,
    ) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            limits,
            sms_provider_slug,
            email_provider_slug,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.send_limits.clone(),
            config.channels.sms_provider_slug.clone(),
            config.channels.email_provider_slug.clone(),
        )
    }

    /// Take `cost` tokens from a single bucket, or reject without deducting.
    pub fn try_consume(&self, key: &str, capacity: f64, refill_per_sec: f64, cost: f64) -> bool {
        self.try_consume_at(key, capacity, refill_per_sec, cost, Instant::now())
    }

    fn try_consume_at(
        &self,
        key: &str,
        capacity: f64,
        refill_per_sec: f64,
        cost: f64,
        now: Instant,
    ) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(capacity, now));
        bucket.refill(capacity, refill_per_sec, now);
        if bucket.tokens < cost {
            return false;
        }
        bucket.tokens -= cost;
        true
    }

    /// Admission gate for one SMS send on behalf of a store.
    pub fn can_send_sms(&self, store_uid: &str) -> bool {
        self.can_send_sms_at(store_uid, Instant::now())
    }

    fn can_send_sms_at(&self, store_uid: &str, now: Instant) -> bool {
        let scopes = send_scopes("sms", store_uid, &self.sms_provider_slug, &self.limits.sms);
        self.admit_all(&scopes, 1.0, now, "sms")
    }

    /// Admission gate for one email send on behalf of a store.
    pub fn can_send_email(&self, store_uid: &str) -> bool {
        self.can_send_email_at(store_uid, Instant::now())
    }

    fn can_send_email_at(&self, store_uid: &str, now: Instant) -> bool {
        let scopes = send_scopes(
            "email",
            store_uid,
            &self.email_provider_slug,
            &self.limits.email,
        );
        self.admit_all(&scopes, 1.0, now, "email")
    }

    /// Refill and check every scope under one lock; deduct only when all admit.
    fn admit_all(
        &self,
        scopes: &[(String, f64, f64)],
        cost: f64,
        now: Instant,
        channel: &str,
    ) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        for (key, capacity, refill_per_sec) in scopes {
            let bucket = buckets
                .entry(key.clone())
                .or_insert_with(|| Bucket::full(*capacity, now));
            bucket.refill(*capacity, *refill_per_sec, now);
            if bucket.tokens < cost {
                debug!(scope = %key, channel, "Outbound send rejected by rate limit");
                let metric_labels = vec![("channel", channel.to_string())];
                counter!("rate_limited_total", &metric_labels).increment(1);
                return false;
            }
        }
        for (key, _, _) in scopes {
            if let Some(bucket) = buckets.get_mut(key) {
                bucket.tokens -= cost;
            }
        }
        true
    }
}

/// Outcome of a sliding-window admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited { retry_after_secs: u64 },
}

/// Sliding-window request limiter for public webhook routes.
///
/// Keeps the timestamps of recent requests per client; a request is rejected
/// while the window already holds the maximum, and the rejection reports how
/// long until the oldest request leaves the window.
#[derive(Debug)]
pub struct PublicRateLimiter {
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl PublicRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            max_requests: max_requests as usize,
            window,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.public_rate_limit_per_minute,
            Duration::from_secs(config.public_rate_limit_window_seconds),
        )
    }

    pub fn try_admit(&self, client_key: &str) -> Admission {
        self.try_admit_at(client_key, Instant::now())
    }

    fn try_admit_at(&self, client_key: &str, now: Instant) -> Admission {
        let mut clients = self.clients.lock().unwrap();
        let requests = clients.entry(client_key.to_string()).or_default();

        // Drop requests that have left the window.
        while let Some(front) = requests.front() {
            if now.saturating_duration_since(*front) >= self.window {
                requests.pop_front();
            } else {
                break;
            }
        }

        if requests.len() >= self.max_requests {
            let oldest = requests.front().copied().unwrap_or(now);
            let elapsed = now.saturating_duration_since(oldest);
            let remaining = self.window.saturating_sub(elapsed);
            let retry_after_secs = (remaining.as_secs_f64().ceil() as u64).max(1);
            return Admission::Limited { retry_after_secs };
        }

        requests.push_back(now);
        Admission::Allowed
    }
}

/// Middleware applying the sliding-window limiter to public routes.
pub async fn public_rate_limit_middleware(
    State(limiter): State<Arc<PublicRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_key(&request);
    match limiter.try_admit(&client) {
        Admission::Allowed => Ok(next.run(request).await),
        Admission::Limited { retry_after_secs } => {
            warn!(client = %client, retry_after_secs, "Public rate limit exceeded");
            counter!("public_rate_limited_total").increment(1);
            Err(ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests",
            )
            .with_retry_after(retry_after_secs))
        }
    }
}

// Client identity for the public window: path plus the first X-Forwarded-For
// hop, so one noisy platform cannot starve the other ingestion endpoint.
fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown");
    format!("{}:{}", request.uri().path(), forwarded)
}
