//! API request handlers

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::GateError,
    mailer::ContactNotifier,
    middleware::{Identity, InputValidator, RequestGate, ValidationError},
    observability::{HealthChecker, MetricsCollector, SystemHealth},
};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<RequestGate>,
    pub health_checker: Arc<HealthChecker>,
    pub metrics: Arc<MetricsCollector>,
    pub notifier: Arc<dyn ContactNotifier>,
    /// Public mount point, if served under a prefix
    pub path_prefix: Option<String>,
}

/// Caller identity as returned by `/v1/me`
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub scopes: Vec<String>,
}

/// Root handler
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": "Landing Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Authenticated, rate-limited API gateway",
        "root_path": state.path_prefix.as_deref().unwrap_or(""),
    }))
}

/// Basic health check
pub async fn health(State(state): State<AppState>) -> Json<SystemHealth> {
    Json(state.health_checker.check_basic())
}

/// Health check including credential store and rate limiter; degraded still answers 200
pub async fn health_detailed(State(state): State<AppState>) -> Json<SystemHealth> {
    Json(state.health_checker.check_detailed())
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

/// Accept a contact form submission, as JSON or an urlencoded form
pub async fn create_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, GateError> {
    let body = body.map_err(|rejection| ValidationError::MalformedBody(rejection.body_text()))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok());

    let request = InputValidator::parse_contact(content_type, &body)?;
    let contact = InputValidator::validate_contact(&request)?;

    if let Err(e) = state.notifier.deliver(&contact).await {
        warn!(notifier = state.notifier.name(), "Contact submission not delivered");
        return Err(GateError::DeliveryFailed(e.to_string()));
    }

    info!(notifier = state.notifier.name(), "Contact submission accepted");
    Ok(Json(json!({ "status": "ok" })))
}

/// Identity of the authenticated caller
pub async fn me(Extension(identity): Extension<Identity>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: identity.user_id,
        scopes: identity.scopes.into_iter().collect(),
    })
}

pub async fn list_workflows() -> Result<StatusCode, GateError> {
    Err(GateError::not_implemented("workflows"))
}

pub async fn list_runs() -> Result<StatusCode, GateError> {
    Err(GateError::not_implemented("runs"))
}
