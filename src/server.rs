//! # Server Configuration
//!
//! This module contains the server setup and configuration for the mirsal API.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{cron_auth_middleware, operator_auth_middleware};
use crate::channels::{ChannelSender, EmailSender, SmsSender};
use crate::config::AppConfig;
use crate::handlers;
use crate::rate_limit::{PublicRateLimiter, RateLimiter, public_rate_limit_middleware};
use crate::telemetry::{TraceContext, with_trace_context};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub limiter: Arc<RateLimiter>,
    pub public_limiter: Arc<PublicRateLimiter>,
    pub senders: Vec<Arc<dyn ChannelSender>>,
}

impl AppState {
    /// Assembles shared state: the send rate limiter, the public ingress
    /// limiter, and the channel sender stack used by the outbox worker.
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config));
        let public_limiter = Arc::new(PublicRateLimiter::from_config(&config));
        let senders: Vec<Arc<dyn ChannelSender>> = vec![
            Arc::new(SmsSender::new(&config.channels)),
            Arc::new(EmailSender::new(&config.channels)),
        ];

        Self {
            db,
            config,
            limiter,
            public_limiter,
            senders,
        }
    }
}

/// Builds application state for in-process handler tests
pub fn create_test_app_state(config: AppConfig, db: DatabaseConnection) -> AppState {
    AppState::new(Arc::new(config), db)
}

/// Middleware that stamps each request with a trace ID, honoring an
/// inbound `x-request-id` when present so upstream proxies can correlate.
async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let context = TraceContext { trace_id };

    let mut request = request;
    request.extensions_mut().insert(context.clone());

    with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route(
            "/webhooks/salla",
            post(handlers::webhooks::receive_salla_webhook),
        )
        .route(
            "/webhooks/zid",
            post(handlers::webhooks::receive_zid_webhook),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.public_limiter),
            public_rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/api/webhooks/retry",
            get(handlers::admin::retry_queue_status).post(handlers::admin::act_on_dlq_entry),
        )
        .route(
            "/api/webhooks/failed",
            get(handlers::admin::list_failed_webhooks),
        )
        .route("/api/jobs", get(handlers::admin::list_outbox_jobs))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            operator_auth_middleware,
        ));

    let cron_routes = Router::new()
        .route(
            "/api/cron/webhook-retry",
            post(handlers::cron::run_webhook_retry_pass),
        )
        .route(
            "/api/jobs/worker-run-once",
            post(handlers::cron::run_worker_once),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            cron_auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .merge(webhook_routes)
        .merge(admin_routes)
        .merge(cron_routes)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(Arc::new(config.clone()), db);
    let app = create_app(state);

    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::readyz,
        crate::handlers::webhooks::receive_salla_webhook,
        crate::handlers::webhooks::receive_zid_webhook,
        crate::handlers::admin::retry_queue_status,
        crate::handlers::admin::act_on_dlq_entry,
        crate::handlers::admin::list_failed_webhooks,
        crate::handlers::admin::list_outbox_jobs,
        crate::handlers::cron::run_webhook_retry_pass,
        crate::handlers::cron::run_worker_once,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::webhooks::WebhookAck,
            crate::handlers::admin::RetryQueueStatus,
            crate::handlers::admin::DlqActionRequest,
            crate::handlers::admin::DlqActionResponse,
            crate::handlers::admin::DlqEntryInfo,
            crate::handlers::admin::DlqListResponse,
            crate::handlers::admin::OutboxJobInfo,
            crate::handlers::admin::OutboxListResponse,
            crate::webhook_retry::RetryRunStats,
            crate::webhook_retry::RetrySystemHealth,
            crate::webhook_retry::ManualRetryOutcome,
            crate::outbox_worker::WorkerRunStats,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Mirsal Delivery API",
        description = "Review invite delivery pipeline: storefront webhooks in, SMS and email out",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
