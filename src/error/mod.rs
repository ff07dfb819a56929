//! Error types for the landing gateway
//!
//! Two layers live here:
//!
//! - [`GatewayError`]: process-level failures (configuration, credential store
//!   loading, binding the listener). These are the only fatal errors.
//! - [`GateError`]: request-level failures. Every one of them is rendered into
//!   the same [`ErrorEnvelope`] shape by [`render_error`].

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::error;

use crate::middleware::{AuthError, RateLimitError, ValidationError};

/// Result type alias for process-level operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Message returned to clients for any unclassified failure
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Message returned when a contact submission could not be mailed
pub const DELIVERY_FAILED_MESSAGE: &str = "Failed to send contact email";

/// Process-level error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}

/// The closed error taxonomy exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MissingCredential,
    InvalidCredential,
    ExpiredCredential,
    RateLimited,
    ValidationFailed,
    NotImplemented,
    Internal,
}

impl ErrorKind {
    /// Every kind, in table order
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::MissingCredential,
        ErrorKind::InvalidCredential,
        ErrorKind::ExpiredCredential,
        ErrorKind::RateLimited,
        ErrorKind::ValidationFailed,
        ErrorKind::NotImplemented,
        ErrorKind::Internal,
    ];

    /// HTTP status for this kind
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::MissingCredential
            | ErrorKind::InvalidCredential
            | ErrorKind::ExpiredCredential => StatusCode::UNAUTHORIZED,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::MissingCredential => "AUTH_MISSING",
            ErrorKind::InvalidCredential => "AUTH_INVALID",
            ErrorKind::ExpiredCredential => "AUTH_EXPIRED",
            ErrorKind::RateLimited => "RATE_LIMIT_EXCEEDED",
            ErrorKind::ValidationFailed => "VALIDATION_ERROR",
            ErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// Look up a kind by its code
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// Request-level error: everything that can stop a request
#[derive(Error, Debug, Clone)]
pub enum GateError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{feature} is not implemented")]
    NotImplemented { feature: String },

    #[error("Internal error: {0}")]
    Internal(String),

    /// Outbound delivery failed; rendered as an internal error with a reason
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

impl GateError {
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        GateError::NotImplemented {
            feature: feature.into(),
        }
    }

    pub fn internal(cause: impl std::fmt::Display) -> Self {
        GateError::Internal(cause.to_string())
    }

    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::Auth(AuthError::MissingCredential) => ErrorKind::MissingCredential,
            GateError::Auth(AuthError::InvalidCredential) => ErrorKind::InvalidCredential,
            GateError::Auth(AuthError::ExpiredCredential) => ErrorKind::ExpiredCredential,
            GateError::RateLimited(_) => ErrorKind::RateLimited,
            GateError::Validation(_) => ErrorKind::ValidationFailed,
            GateError::NotImplemented { .. } => ErrorKind::NotImplemented,
            GateError::Internal(_) | GateError::DeliveryFailed(_) => ErrorKind::Internal,
        }
    }

    /// Whole seconds a client should wait, for rate-limit errors only
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GateError::RateLimited(err) => Some(err.retry_after_secs()),
            _ => None,
        }
    }
}

/// Normalized error body
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub error_code: String,
    pub message: String,
    pub details: Option<Map<String, Value>>,
}

/// Wire form: `{"error": {"code", "message", "details"?}}`
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    error: WireBody,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireBody {
    code: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Map<String, Value>>,
}

impl ErrorEnvelope {
    /// JSON body sent to clients
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "code": self.error_code,
            "message": self.message,
        });
        if let (Some(details), Some(obj)) = (&self.details, body.as_object_mut()) {
            obj.insert("details".to_string(), Value::Object(details.clone()));
        }
        json!({ "error": body })
    }

    /// Parse a response body back into an envelope
    pub fn from_body(status_code: u16, body: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        let wire: WireEnvelope = serde_json::from_slice(body)?;
        Ok(Self {
            status_code,
            error_code: wire.error.code,
            message: wire.error.message,
            details: wire.error.details,
        })
    }

    /// Taxonomy kind, if the code belongs to it
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(&self.error_code)
    }
}

/// Render any gate error into the envelope shape.
///
/// Internal causes never reach the client; they are logged here instead.
pub fn render_error(err: &GateError) -> ErrorEnvelope {
    let kind = err.kind();
    let (message, details) = match err {
        GateError::Auth(e) => (e.to_string(), None),
        GateError::RateLimited(e) => (e.to_string(), Some(e.details())),
        GateError::Validation(e) => (e.to_string(), e.details()),
        GateError::NotImplemented { feature } => {
            let mut details = Map::new();
            details.insert("feature".to_string(), Value::from(feature.as_str()));
            (err.to_string(), Some(details))
        }
        GateError::Internal(cause) => {
            error!(cause = %cause, "Unhandled internal error");
            (INTERNAL_ERROR_MESSAGE.to_string(), None)
        }
        GateError::DeliveryFailed(cause) => {
            error!(cause = %cause, "Contact email delivery failed");
            let mut details = Map::new();
            details.insert("reason".to_string(), Value::from("EMAIL_SEND_FAILED"));
            (DELIVERY_FAILED_MESSAGE.to_string(), Some(details))
        }
    };

    ErrorEnvelope {
        status_code: kind.status().as_u16(),
        error_code: kind.code().to_string(),
        message,
        details,
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let envelope = render_error(&self);
        let mut response = envelope.into_response();
        // Lets outer layers count errors by kind
        response.extensions_mut().insert(self.kind());

        let headers = response.headers_mut();

        if let Some(secs) = self.retry_after_secs() {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if matches!(self, GateError::Auth(_)) {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}
