//! Landing Gateway - authenticated, rate-limited HTTP gateway
//!
//! Every protected request passes through a [`RequestGate`](middleware::RequestGate):
//! the bearer credential is validated first, then the caller's fixed-window
//! rate-limit bucket is charged. Any failure, from a missing credential to a
//! panicking handler, leaves the service as the same JSON error envelope:
//!
//! ```json
//! {"error": {"code": "RATE_LIMIT_EXCEEDED", "message": "...", "details": {...}}}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use landing_gateway::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_file_with_env("config.toml")?;
//!     landing_gateway::server::run(config).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod mailer;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use error::{render_error, ErrorEnvelope, ErrorKind, GateError, GatewayError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{render_error, ErrorEnvelope, ErrorKind, GateError, GatewayError, Result};
    pub use crate::middleware::{
        CredentialRecord, CredentialStore, CredentialValidator, GateRequest, Identity,
        RateLimitConfig, RateLimiter, RequestGate,
    };
    pub use crate::observability::{HealthChecker, MetricsCollector};
    pub use crate::server::Gateway;
}
