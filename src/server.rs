//! Gateway assembly and HTTP server lifecycle

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::{
    api::{build_router, AppState},
    config::Config,
    error::{GatewayError, Result},
    mailer::{self, ContactNotifier},
    middleware::{
        Clock, CredentialStore, CredentialValidator, RateLimitConfig, RateLimiter, RequestGate,
        SystemClock, TrustedProxies,
    },
    observability::{HealthChecker, MetricsCollector},
    shutdown::ShutdownCoordinator,
};

/// A fully wired gateway: the router plus the shared components behind it
pub struct Gateway {
    pub router: Router,
    pub gate: Arc<RequestGate>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<MetricsCollector>,
}

impl Gateway {
    /// Load the credential store named by the configuration and wire everything
    pub async fn build(config: &Config) -> Result<Self> {
        let store = CredentialStore::load(&config.auth.credential_source).await?;
        let notifier = mailer::from_config(&config.email)?;
        Ok(Self::assemble(config, store, Arc::new(SystemClock), notifier))
    }

    /// Wire the gateway around an already loaded store and notifier
    pub fn assemble(
        config: &Config,
        store: CredentialStore,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn ContactNotifier>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new());

        let validator = Arc::new(CredentialValidator::with_clock(
            Arc::new(store),
            clock.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::from(&config.rate_limit)));

        let gate = Arc::new(
            RequestGate::new(validator.clone(), limiter.clone())
                .with_clock(clock)
                .with_metrics(metrics.clone())
                .with_trusted_proxies(TrustedProxies::from_config(&config.server.trusted_proxies)),
        );

        let health_checker = Arc::new(
            HealthChecker::new()
                .with_validator(validator)
                .with_rate_limiter(limiter.clone()),
        );

        let state = AppState {
            gate: gate.clone(),
            health_checker,
            metrics: metrics.clone(),
            notifier,
            path_prefix: config.server.path_prefix.clone(),
        };
        let router = build_router(state, &config.server);

        Self {
            router,
            gate,
            limiter,
            metrics,
        }
    }
}

/// Serve until Ctrl+C or SIGTERM, then drain and release limiter state
pub async fn run(config: Config) -> Result<()> {
    let gateway = Gateway::build(&config).await?;

    let coordinator = Arc::new(ShutdownCoordinator::new());
    let cleanup = gateway
        .limiter
        .clone()
        .start_cleanup_task(Arc::new(SystemClock), coordinator.subscribe());
    info!(
        limit = config.rate_limit.limit,
        window_seconds = config.rate_limit.window_seconds,
        enabled = config.rate_limit.enabled,
        "Rate limiter initialized with cleanup task"
    );

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::Server(format!("Cannot bind {}: {}", addr, e)))?;
    info!("Server listening on {}", addr);

    let signals = coordinator.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    let mut notifier = coordinator.subscribe();
    axum::serve(
        listener,
        gateway
            .router
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { notifier.wait().await })
    .await?;

    // Serving can also end without a signal; make sure the cleanup task stops
    coordinator.shutdown();
    let _ = cleanup.await;
    gateway.limiter.clear();

    info!("Server shutdown complete");
    Ok(())
}
