//! API route configuration

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::ServerConfig,
    error::{ErrorEnvelope, ErrorKind, GateError},
    middleware::{AllowedHosts, GateRequest, RequestGate, TrustedProxies, ValidationError},
    observability::MetricsCollector,
};

use super::handlers::{self, AppState};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub const PROCESS_TIME_HEADER: HeaderName = HeaderName::from_static("x-process-time");

/// Build the complete API router with middleware
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    // Routes behind the full gate: credential, then the caller's user bucket
    let protected_routes = Router::new()
        .route("/v1/me", get(handlers::me))
        .route("/v1/workflows", get(handlers::list_workflows))
        .route("/v1/runs", get(handlers::list_runs))
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_identity,
        ));

    // Public form routes, throttled per client IP
    let throttled_routes = Router::new()
        .route("/v1/contact", post(handlers::create_contact))
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            throttle_ip,
        ));

    let mut router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/health/detailed", get(handlers::health_detailed))
        .route("/metrics", get(handlers::metrics))
        .merge(protected_routes)
        .merge(throttled_routes)
        .with_state(state.clone());

    if server.max_body_size_kb > 0 {
        router = router.layer(RequestBodyLimitLayer::new(server.max_body_size_kb * 1024));
    }

    router = router.layer(CatchPanicLayer::custom(handle_panic));

    let allowed_hosts = AllowedHosts::new(&server.allowed_hosts);
    if !allowed_hosts.allows_any() {
        router = router.layer(middleware::from_fn_with_state(allowed_hosts, check_host));
    }

    router = router.layer(middleware::from_fn_with_state(
        (state.metrics.clone(), state.gate.trusted_proxies().clone()),
        track_requests,
    ));

    if !server.cors_origins.is_empty() {
        router = router.layer(cors_layer(&server.cors_origins));
    }

    router.layer(TraceLayer::new_for_http())
}

fn peer_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Authenticate and charge the caller's user bucket
async fn require_identity(
    State(gate): State<Arc<RequestGate>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let gate_request =
        GateRequest::from_parts(req.headers(), peer_addr(&req), gate.trusted_proxies());
    let identity = gate.authorize(&gate_request)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Charge the caller's IP bucket
async fn throttle_ip(
    State(gate): State<Arc<RequestGate>>,
    req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let gate_request =
        GateRequest::from_parts(req.headers(), peer_addr(&req), gate.trusted_proxies());
    gate.throttle(&gate_request)?;
    Ok(next.run(req).await)
}

/// Reject requests addressed to a host that is not configured
async fn check_host(
    State(hosts): State<AllowedHosts>,
    req: Request,
    next: Next,
) -> Result<Response, GateError> {
    hosts.check(req.headers(), req.uri())?;
    Ok(next.run(req).await)
}

/// Request logging, timing headers and request metrics
async fn track_requests(
    State((metrics, proxies)): State<(Arc<MetricsCollector>, TrustedProxies)>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let client_ip = proxies
        .client_ip(req.headers(), peer_addr(&req))
        .map(|ip| ip.to_string());

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        client_ip = client_ip.as_deref().unwrap_or("unknown"),
        "Request started"
    );

    let mut response = normalize_error(next.run(req).await);
    let elapsed = start.elapsed();

    metrics.record_request(elapsed);
    if let Some(kind) = response.extensions().get::<ErrorKind>() {
        metrics.record_error(*kind);
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        headers.insert(PROCESS_TIME_HEADER, value);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = elapsed.as_millis() as u64,
        "Request completed"
    );

    response
}

/// Give error responses produced outside the gate and handlers the envelope shape
fn normalize_error(response: Response) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error())
        || response.extensions().get::<ErrorKind>().is_some()
    {
        return response;
    }

    let mut normalized = match status {
        StatusCode::PAYLOAD_TOO_LARGE => GateError::from(ValidationError::MalformedBody(
            "Request body too large".to_string(),
        ))
        .into_response(),
        StatusCode::NOT_FOUND => routing_error(status, "NOT_FOUND", "Resource not found"),
        StatusCode::METHOD_NOT_ALLOWED => {
            routing_error(status, "METHOD_NOT_ALLOWED", "Method not allowed")
        }
        _ => GateError::internal(format!("unclassified {} response", status)).into_response(),
    };

    for (name, value) in response.headers() {
        if name != header::CONTENT_TYPE
            && name != header::CONTENT_LENGTH
            && !normalized.headers().contains_key(name)
        {
            normalized.headers_mut().insert(name.clone(), value.clone());
        }
    }
    normalized
}

fn routing_error(status: StatusCode, code: &str, message: &str) -> Response {
    ErrorEnvelope {
        status_code: status.as_u16(),
        error_code: code.to_string(),
        message: message.to_string(),
        details: None,
    }
    .into_response()
}

/// Turn a handler panic into an internal error envelope
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    GateError::internal(format!("handler panicked: {}", detail)).into_response()
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
