use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, security_headers_middleware, trace_id,
};
use crate::routes::{commands, device_api, devices, health};
use crate::services::DispatchHandle;
use crate::ws::{self, ConnectionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub dispatch: DispatchHandle,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            registry: ConnectionRegistry::new(),
            dispatch: DispatchHandle::new(),
        }
    }
}

/// Build the application router from a prepared state.
///
/// Split from [`create_app`] so the binary can hand the same registry and
/// dispatch handle to the background worker.
pub fn router(state: AppState) -> Router {
    // Build CORS layer based on configuration
    let cors = if state.config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        // Production: only allow specified origins
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = state
            .config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Operator endpoints (Bearer JWT, enforced by the OperatorAuth extractor)
    let operator_routes = Router::new()
        .route("/api/commands/dispatch", post(commands::dispatch_commands))
        .route("/api/commands/batches", get(commands::list_command_batches))
        .route(
            "/api/commands/batches/:batch_id",
            get(commands::get_batch_detail),
        )
        .route(
            "/api/commands/batches/:batch_id/retry",
            post(commands::retry_command_batch),
        )
        .route("/api/devices", get(devices::list_devices))
        .route("/api/devices/:device_no", get(devices::get_device));

    // Device-facing endpoints (device_no-addressed, matching the firmware
    // wire contract)
    let device_routes = Router::new()
        .route(
            "/api/devices/:device_no/commands/pending",
            get(device_api::poll_pending_commands),
        )
        .route(
            "/api/devices/:device_no/command_result",
            post(device_api::report_command_result),
        );

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let request_timeout = state.config.server.request_timeout_secs;

    Router::new()
        .merge(public_routes)
        .merge(operator_routes)
        .merge(device_routes)
        .route("/api/ws", get(ws::ws_handler))
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout)))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}

/// Build the application router, constructing a fresh state.
pub fn create_app(config: Config, pool: PgPool) -> Router {
    router(AppState::new(config, pool))
}
