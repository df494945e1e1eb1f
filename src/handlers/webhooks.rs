//! # Webhook Ingestion Handlers
//!
//! Order webhooks from Salla and Zid enter the pipeline here: the platform
//! credential is verified, the delivery claims an idempotency key, and the
//! order becomes a review invite plus an outbox job. A processing failure
//! after the claim is parked in the webhook retry queue and still answered
//! with 200 so the platform does not redeliver; the retry cron owns recovery.

use std::collections::{HashMap, HashSet};

use axum::{body::Bytes, extract::State, http::HeaderMap, response::Json};
use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::channels::{Channel, JobPayload};
use crate::config::AppConfig;
use crate::error::{self, ApiError};
use crate::idempotency::{ensure_single_invite_key, event_key_for_webhook, with_event_once, EventOutcome};
use crate::outbox_worker::compute_next_backoff_ms;
use crate::repositories::{
    NewOutboxJob, NewReviewInvite, NewWebhookRetry, OutboxRepository, ReviewInviteRepository,
    WebhookRetryRepository,
};
use crate::server::AppState;
use crate::webhook_verification::{verify_webhook, SALLA_SIGNATURE_HEADER, ZID_TOKEN_HEADER};

/// Salla event type that produces a review invite.
const SALLA_ORDER_EVENT: &str = "order.completed";

/// Zid event type that produces a review invite.
const ZID_ORDER_EVENT: &str = "order.delivered";

/// A storefront order extracted from a platform webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub store_uid: String,
    pub order_id: String,
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// What processing one verified order event produced.
#[derive(Debug)]
pub enum IngestOutcome {
    /// A review invite was created and its notification job enqueued.
    Created { invite_id: Uuid, job_id: Uuid },
    /// The order already has an invite; nothing left to do.
    DuplicateOrder,
    /// The event type is not one the pipeline handles.
    Ignored,
}

/// Acknowledgement returned to the webhook platform.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// One of `processed`, `duplicate`, `ignored`, `parked`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

impl WebhookAck {
    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            invite_id: None,
            job_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SallaEnvelope {
    merchant: i64,
    data: SallaOrder,
}

#[derive(Debug, Deserialize)]
struct SallaOrder {
    id: i64,
    #[serde(default)]
    customer: Option<SallaCustomer>,
}

#[derive(Debug, Default, Deserialize)]
struct SallaCustomer {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    mobile: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZidEnvelope {
    store_id: i64,
    order: ZidOrder,
}

#[derive(Debug, Deserialize)]
struct ZidOrder {
    id: i64,
    #[serde(default)]
    customer: Option<ZidCustomer>,
}

#[derive(Debug, Default, Deserialize)]
struct ZidCustomer {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn full_name(first: Option<String>, last: Option<String>) -> Option<String> {
    let parts: Vec<String> = [first, last]
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Distill a platform payload into an [`OrderEvent`].
///
/// Returns `Ok(None)` for event types the pipeline does not handle; those
/// are acknowledged without claiming an idempotency key. A handled event
/// that cannot produce a deliverable invite (structurally broken, or no
/// customer contact at all) is a validation error.
pub fn extract_order_event(
    platform: &str,
    payload: &JsonValue,
) -> Result<Option<OrderEvent>, ApiError> {
    let event_name = payload
        .get("event")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| {
            error::validation_error(
                "Webhook payload is missing the event field",
                json!({ "event": "required" }),
            )
        })?;

    let event = match platform {
        "salla" => {
            if event_name != SALLA_ORDER_EVENT {
                return Ok(None);
            }
            let envelope: SallaEnvelope = serde_json::from_value(payload.clone()).map_err(|e| {
                error::validation_error(
                    "Malformed Salla order payload",
                    json!({ "error": e.to_string() }),
                )
            })?;
            let customer = envelope.data.customer.unwrap_or_default();
            OrderEvent {
                store_uid: format!("salla-{}", envelope.merchant),
                order_id: envelope.data.id.to_string(),
                customer_name: full_name(customer.first_name, customer.last_name),
                phone: non_empty(customer.mobile),
                email: non_empty(customer.email),
            }
        }
        "zid" => {
            if event_name != ZID_ORDER_EVENT {
                return Ok(None);
            }
            let envelope: ZidEnvelope = serde_json::from_value(payload.clone()).map_err(|e| {
                error::validation_error(
                    "Malformed Zid order payload",
                    json!({ "error": e.to_string() }),
                )
            })?;
            let customer = envelope.order.customer.unwrap_or_default();
            OrderEvent {
                store_uid: format!("zid-{}", envelope.store_id),
                order_id: envelope.order.id.to_string(),
                customer_name: non_empty(customer.name),
                phone: non_empty(customer.phone),
                email: non_empty(customer.email),
            }
        }
        other => {
            return Err(error::validation_error(
                "Unsupported webhook platform",
                json!({ "platform": other }),
            ));
        }
    };

    if event.phone.is_none() && event.email.is_none() {
        return Err(error::validation_error(
            "Order carries no deliverable customer contact",
            json!({ "customer": "phone or email required" }),
        ));
    }

    Ok(Some(event))
}

fn review_url_for(config: &AppConfig, store_uid: &str, order_id: &str) -> String {
    format!(
        "{}/r/{}/{}",
        config.review_base_url.trim_end_matches('/'),
        store_uid,
        order_id
    )
}

/// Compose the requested channels and per-channel content for one invite.
fn build_job(event: &OrderEvent, review_url: &str) -> (Vec<Channel>, JobPayload) {
    let greeting = event.customer_name.as_deref().unwrap_or("there");

    let mut channels = Vec::new();
    let mut payload = JobPayload::default();

    if let Some(phone) = &event.phone {
        channels.push(Channel::Sms);
        payload.phone = Some(phone.clone());
        payload.sms_text = Some(format!(
            "Hi {}, thanks for your order! We'd love your feedback: {}",
            greeting, review_url
        ));
    }

    if let Some(email) = &event.email {
        channels.push(Channel::Email);
        payload.email_to = Some(email.clone());
        payload.email_subject = Some("How was your order?".to_string());
        payload.email_html = Some(format!(
            "<p>Hi {},</p><p>Thanks for your order! We'd love to hear what you think.</p><p><a href=\"{}\">Leave a review</a></p>",
            greeting, review_url
        ));
    }

    (channels, payload)
}

/// Guard the per-order invite key, create the invite, and enqueue its job.
async fn process_order(
    db: &DatabaseConnection,
    config: &AppConfig,
    event: &OrderEvent,
) -> Result<IngestOutcome, ApiError> {
    if !ensure_single_invite_key(db, &event.store_uid, &event.order_id).await? {
        info!(
            store_uid = %event.store_uid,
            order_id = %event.order_id,
            "Order already has a review invite, skipping"
        );
        return Ok(IngestOutcome::DuplicateOrder);
    }

    let review_url = review_url_for(config, &event.store_uid, &event.order_id);

    let invite_repo = ReviewInviteRepository::new(db.clone());
    let invite = invite_repo
        .insert_invite(NewReviewInvite {
            store_uid: event.store_uid.clone(),
            order_id: event.order_id.clone(),
            customer_name: event.customer_name.clone(),
            phone: event.phone.clone(),
            email: event.email.clone(),
            review_url: review_url.clone(),
        })
        .await?;

    let (channels, payload) = build_job(event, &review_url);

    let outbox_repo = OutboxRepository::new(db.clone());
    let job_id = outbox_repo
        .enqueue_invite_job(NewOutboxJob {
            invite_id: invite.id,
            store_uid: event.store_uid.clone(),
            channels,
            payload,
        })
        .await?;

    Ok(IngestOutcome::Created {
        invite_id: invite.id,
        job_id,
    })
}

/// Re-runnable core of webhook ingestion: extract the order and process it.
///
/// The webhook retry processor calls this directly with the stored payload.
/// There is no outer delivery claim here; the per-order invite key inside
/// [`process_order`] is what makes replays converge instead of
/// double-inviting.
pub async fn ingest_order_event(
    db: &DatabaseConnection,
    config: &AppConfig,
    platform: &str,
    payload: &JsonValue,
) -> Result<IngestOutcome, ApiError> {
    let Some(event) = extract_order_event(platform, payload)? else {
        return Ok(IngestOutcome::Ignored);
    };
    process_order(db, config, &event).await
}

// Credential and signature headers never land in the retry queue.
fn capture_headers(headers: &HeaderMap) -> JsonValue {
    let sensitive: HashSet<&str> = HashSet::from([
        "authorization",
        "cookie",
        "set-cookie",
        "proxy-authorization",
        "x-api-key",
        SALLA_SIGNATURE_HEADER,
        ZID_TOKEN_HEADER,
    ]);

    let captured: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str().to_lowercase();
            if sensitive.contains(name.as_str()) {
                return None;
            }
            Some((name, value.to_str().unwrap_or("").to_string()))
        })
        .collect();

    json!(captured)
}

/// Park a failed delivery in the retry queue and acknowledge it.
async fn park_failed_webhook(
    state: &AppState,
    platform: &str,
    event_key: &str,
    payload: JsonValue,
    headers: &HeaderMap,
    err: ApiError,
) -> Result<Json<WebhookAck>, ApiError> {
    error!(
        platform,
        code = %err.code,
        error = %err.message,
        "Webhook processing failed, parking for retry"
    );

    let retry_repo = WebhookRetryRepository::new(state.db.clone());
    retry_repo
        .insert_entry(NewWebhookRetry {
            platform: platform.to_string(),
            event_key: event_key.to_string(),
            payload,
            headers: capture_headers(headers),
            error: serde_json::to_value(&err).unwrap_or_default(),
            next_retry_at: (Utc::now() + Duration::milliseconds(compute_next_backoff_ms(0)))
                .fixed_offset(),
        })
        .await?;

    let metric_labels = vec![("platform", platform.to_string())];
    counter!("webhook_parked_total", &metric_labels).increment(1);

    Ok(Json(WebhookAck::with_status("parked")))
}

/// Shared ingestion flow behind both platform routes.
async fn handle_webhook(
    state: &AppState,
    platform: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let credential = verify_webhook(platform, body, headers, &state.config)?;

    let payload: JsonValue = serde_json::from_slice(body).map_err(|e| {
        error::validation_error(
            "Webhook body is not valid JSON",
            json!({ "error": e.to_string() }),
        )
    })?;

    // Unhandled event types are acknowledged without claiming a key, so the
    // key is still fresh if this event type ever becomes handled.
    let Some(event) = extract_order_event(platform, &payload)? else {
        let metric_labels = vec![("platform", platform.to_string())];
        counter!("webhook_ignored_total", &metric_labels).increment(1);
        return Ok(Json(WebhookAck::with_status("ignored")));
    };

    let event_key = event_key_for_webhook(platform, &credential, body);

    let outcome = with_event_once(&state.db, &event_key, || {
        process_order(&state.db, &state.config, &event)
    })
    .await;

    let metric_labels = vec![("platform", platform.to_string())];
    match outcome {
        Ok(EventOutcome::Executed(IngestOutcome::Created { invite_id, job_id })) => {
            info!(
                platform,
                invite_id = %invite_id,
                job_id = %job_id,
                "Webhook processed, review invite enqueued"
            );
            counter!("webhook_processed_total", &metric_labels).increment(1);
            Ok(Json(WebhookAck {
                status: "processed".to_string(),
                invite_id: Some(invite_id),
                job_id: Some(job_id),
            }))
        }
        Ok(EventOutcome::Executed(IngestOutcome::DuplicateOrder))
        | Ok(EventOutcome::Executed(IngestOutcome::Ignored))
        | Ok(EventOutcome::Skipped) => {
            counter!("webhook_duplicate_total", &metric_labels).increment(1);
            Ok(Json(WebhookAck::with_status("duplicate")))
        }
        Err(err) => park_failed_webhook(state, platform, &event_key, payload, headers, err).await,
    }
}

/// Receive a Salla order webhook
///
/// Salla signs the raw body with HMAC-SHA256; the hex digest arrives in the
/// `X-Salla-Signature` header.
#[utoipa::path(
    post,
    path = "/webhooks/salla",
    params(
        ("X-Salla-Signature" = String, Header, description = "Hex HMAC-SHA256 signature of the raw body")
    ),
    request_body(content = JsonValue, description = "Salla webhook envelope", content_type = "application/json"),
    responses(
        (status = 200, description = "Webhook acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload", body = ApiError),
        (status = 401, description = "Signature verification failed", body = ApiError),
        (status = 429, description = "Rate limit exceeded", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_salla_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    handle_webhook(&state, "salla", &headers, &body).await
}

/// Receive a Zid order webhook
///
/// Zid presents a shared token in the `X-Zid-Token` header.
#[utoipa::path(
    post,
    path = "/webhooks/zid",
    params(
        ("X-Zid-Token" = String, Header, description = "Shared webhook token")
    ),
    request_body(content = JsonValue, description = "Zid webhook envelope", content_type = "application/json"),
    responses(
        (status = 200, description = "Webhook acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload", body = ApiError),
        (status = 401, description = "Token verification failed", body = ApiError),
        (status = 429, description = "Rate limit exceeded", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_zid_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    handle_webhook(&state, "zid", &headers, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hmac::{Hmac, Mac};
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectionTrait, EntityTrait};
    use sha2::Sha256;
    use tower::ServiceExt;

    use crate::db::init_pool;
    use crate::models::{outbox_job, review_invite, webhook_retry};

    fn salla_signature(body: &str, secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn salla_order_body(order_id: i64) -> String {
        json!({
            "event": "order.completed",
            "merchant": 42,
            "data": {
                "id": order_id,
                "customer": {
                    "first_name": "Sara",
                    "last_name": "Hassan",
                    "mobile": "+966500000001",
                    "email": "sara@example.com"
                }
            }
        })
        .to_string()
    }

    async fn setup_test_app() -> (AppState, axum::Router) {
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            webhook_salla_secret: Some("salla-secret".to_string()),
            webhook_zid_token: Some("zid-token".to_string()),
            ..Default::default()
        };

        let db = init_pool(&config).await.expect("Failed to init test DB");
        Migrator::up(&db, None).await.unwrap();

        let state = crate::server::create_test_app_state(config, db);
        let app = crate::server::create_app(state.clone());
        (state, app)
    }

    fn salla_request(body: &str, signature: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhooks/salla")
            .header("Content-Type", "application/json")
            .header("X-Salla-Signature", signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn ack_from(response: axum::response::Response) -> WebhookAck {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_extract_salla_order() {
        let payload = serde_json::from_str(&salla_order_body(9001)).unwrap();
        let event = extract_order_event("salla", &payload).unwrap().unwrap();

        assert_eq!(event.store_uid, "salla-42");
        assert_eq!(event.order_id, "9001");
        assert_eq!(event.customer_name.as_deref(), Some("Sara Hassan"));
        assert_eq!(event.phone.as_deref(), Some("+966500000001"));
        assert_eq!(event.email.as_deref(), Some("sara@example.com"));
    }

    #[test]
    fn test_extract_zid_order() {
        let payload = json!({
            "event": "order.delivered",
            "store_id": 7,
            "order": {
                "id": 555,
                "customer": { "name": "Omar", "phone": "+966511111111" }
            }
        });

        let event = extract_order_event("zid", &payload).unwrap().unwrap();
        assert_eq!(event.store_uid, "zid-7");
        assert_eq!(event.order_id, "555");
        assert_eq!(event.customer_name.as_deref(), Some("Omar"));
        assert_eq!(event.phone.as_deref(), Some("+966511111111"));
        assert_eq!(event.email, None);
    }

    #[test]
    fn test_extract_ignores_unhandled_event_types() {
        let payload = json!({ "event": "order.created", "merchant": 42, "data": { "id": 1 } });
        assert!(extract_order_event("salla", &payload).unwrap().is_none());

        let payload = json!({ "event": "product.updated", "store_id": 7 });
        assert!(extract_order_event("zid", &payload).unwrap().is_none());
    }

    #[test]
    fn test_extract_rejects_missing_event_field() {
        let payload = json!({ "merchant": 42 });
        let err = extract_order_event("salla", &payload).unwrap_err();
        assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_extract_rejects_structurally_broken_order() {
        // Handled event type but no merchant field.
        let payload = json!({ "event": "order.completed", "data": { "id": 1 } });
        let err = extract_order_event("salla", &payload).unwrap_err();
        assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_extract_rejects_order_without_contact() {
        let payload = json!({
            "event": "order.completed",
            "merchant": 42,
            "data": { "id": 1, "customer": { "first_name": "Sara", "mobile": "  " } }
        });
        let err = extract_order_event("salla", &payload).unwrap_err();
        assert_eq!(err.code.as_ref(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_build_job_requests_channels_for_present_contacts() {
        let event = OrderEvent {
            store_uid: "salla-42".to_string(),
            order_id: "9001".to_string(),
            customer_name: Some("Sara".to_string()),
            phone: Some("+966500000001".to_string()),
            email: Some("sara@example.com".to_string()),
        };

        let (channels, payload) = build_job(&event, "https://reviews.test/r/salla-42/9001");
        assert_eq!(channels, vec![Channel::Sms, Channel::Email]);
        assert!(payload
            .sms_text
            .unwrap()
            .contains("https://reviews.test/r/salla-42/9001"));
        assert_eq!(payload.email_to.as_deref(), Some("sara@example.com"));
        assert!(payload.email_html.unwrap().contains("Leave a review"));
    }

    #[test]
    fn test_build_job_email_only() {
        let event = OrderEvent {
            store_uid: "zid-7".to_string(),
            order_id: "555".to_string(),
            customer_name: None,
            phone: None,
            email: Some("omar@example.com".to_string()),
        };

        let (channels, payload) = build_job(&event, "https://reviews.test/r/zid-7/555");
        assert_eq!(channels, vec![Channel::Email]);
        assert_eq!(payload.sms_text, None);
        assert_eq!(payload.phone, None);
        // Unnamed customers get a neutral greeting.
        assert!(payload.email_html.unwrap().contains("Hi there"));
    }

    #[test]
    fn test_capture_headers_drops_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-salla-signature", "deadbeef".parse().unwrap());
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        headers.insert("x-request-id", "req-1".parse().unwrap());

        let captured = capture_headers(&headers);
        assert_eq!(captured["content-type"], "application/json");
        assert_eq!(captured["x-request-id"], "req-1");
        assert!(captured.get("x-salla-signature").is_none());
        assert!(captured.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_salla_webhook_creates_invite_and_job() {
        let (state, app) = setup_test_app().await;

        let body = salla_order_body(9001);
        let signature = salla_signature(&body, "salla-secret");

        let response = app.oneshot(salla_request(&body, &signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let ack = ack_from(response).await;
        assert_eq!(ack.status, "processed");
        let invite_id = ack.invite_id.unwrap();

        let invite = review_invite::Entity::find_by_id(invite_id)
            .one(&state.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invite.store_uid, "salla-42");
        assert_eq!(invite.order_id, "9001");
        assert_eq!(invite.status, "created");
        assert!(invite.review_url.ends_with("/r/salla-42/9001"));

        let job = outbox_job::Entity::find_by_id(ack.job_id.unwrap())
            .one(&state.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, "pending");
        assert_eq!(job.attempts, 0);
        assert_eq!(job.invite_id, invite_id);
    }

    #[tokio::test]
    async fn test_replayed_delivery_is_acknowledged_as_duplicate() {
        let (state, app) = setup_test_app().await;

        let body = salla_order_body(9002);
        let signature = salla_signature(&body, "salla-secret");

        let first = app
            .clone()
            .oneshot(salla_request(&body, &signature))
            .await
            .unwrap();
        assert_eq!(ack_from(first).await.status, "processed");

        let second = app.oneshot(salla_request(&body, &signature)).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(ack_from(second).await.status, "duplicate");

        let invites = review_invite::Entity::find().all(&state.db).await.unwrap();
        assert_eq!(invites.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_delivery_for_same_order_does_not_double_invite() {
        let (state, app) = setup_test_app().await;

        let body = salla_order_body(9003);
        let signature = salla_signature(&body, "salla-secret");
        let first = app
            .clone()
            .oneshot(salla_request(&body, &signature))
            .await
            .unwrap();
        assert_eq!(ack_from(first).await.status, "processed");

        // A re-send with different whitespace has a different delivery key
        // but targets the same order.
        let variant = format!(" {}", salla_order_body(9003));
        let signature = salla_signature(&variant, "salla-secret");
        let second = app
            .oneshot(salla_request(&variant, &signature))
            .await
            .unwrap();
        assert_eq!(ack_from(second).await.status, "duplicate");

        let invites = review_invite::Entity::find().all(&state.db).await.unwrap();
        assert_eq!(invites.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_signature_is_rejected() {
        let (_state, app) = setup_test_app().await;

        let body = salla_order_body(9004);
        let response = app
            .oneshot(salla_request(&body, &hex::encode([0u8; 32])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unhandled_event_type_is_ignored_without_claiming() {
        let (state, app) = setup_test_app().await;

        let body = json!({ "event": "order.created", "merchant": 42, "data": { "id": 1 } })
            .to_string();
        let signature = salla_signature(&body, "salla-secret");

        let response = app.oneshot(salla_request(&body, &signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ack_from(response).await.status, "ignored");

        let invites = review_invite::Entity::find().all(&state.db).await.unwrap();
        assert!(invites.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_rejected() {
        let (_state, app) = setup_test_app().await;

        let body = "{not json";
        let signature = salla_signature(body, "salla-secret");

        let response = app.oneshot(salla_request(body, &signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_zid_webhook_with_token() {
        let (_state, app) = setup_test_app().await;

        let body = json!({
            "event": "order.delivered",
            "store_id": 7,
            "order": { "id": 31, "customer": { "name": "Omar", "email": "omar@example.com" } }
        })
        .to_string();

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/zid")
            .header("Content-Type", "application/json")
            .header("X-Zid-Token", "zid-token")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ack_from(response).await.status, "processed");
    }

    #[tokio::test]
    async fn test_zid_webhook_rejects_wrong_token() {
        let (_state, app) = setup_test_app().await;

        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/zid")
            .header("Content-Type", "application/json")
            .header("X-Zid-Token", "wrong")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_processing_failure_parks_entry_and_returns_200() {
        let (state, app) = setup_test_app().await;

        // Make the enqueue step fail after the delivery claim.
        state
            .db
            .execute_unprepared("DROP TABLE outbox_jobs")
            .await
            .unwrap();

        let body = salla_order_body(9005);
        let signature = salla_signature(&body, "salla-secret");

        let response = app.oneshot(salla_request(&body, &signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ack_from(response).await.status, "parked");

        let entries = webhook_retry::Entity::find().all(&state.db).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].platform, "salla");
        assert_eq!(entries[0].attempts, 1);
        assert!(entries[0].last_error.is_some());
        // The original payload is preserved for replay.
        assert_eq!(entries[0].payload["data"]["id"], 9005);
        // Credential headers are not persisted.
        assert!(entries[0].headers.get("x-salla-signature").is_none());
    }
}
