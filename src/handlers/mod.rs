//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the notification
//! pipeline API.

pub mod admin;
pub mod cron;
pub mod webhooks;

use axum::{extract::State, response::Json};
use serde_json::{json, Value as JsonValue};

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is live")
    ),
    tag = "root"
)]
pub async fn healthz() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe that checks database connectivity
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Service is ready"),
        (status = 500, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn readyz(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    state.db.ping().await?;
    Ok(Json(json!({ "status": "ready" })))
}
