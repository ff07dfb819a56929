//! Middleware components for request processing

pub mod auth;
pub mod clock;
pub mod credentials;
pub mod gate;
pub mod hosts;
pub mod rate_limiter;
pub mod validator;

pub use auth::{AuthError, CredentialValidator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialRecord, CredentialStore, Identity};
pub use gate::{GateRequest, RequestGate, TrustedProxies};
pub use hosts::AllowedHosts;
pub use rate_limiter::{RateKey, RateLimitConfig, RateLimitError, RateLimiter};
pub use validator::{ContactRequest, InputValidator, ValidationError};
