// Module: http
// HTTP surface: the WebSocket endpoint, internal relay ingress and health probes

pub mod error;
pub mod health;
pub mod internal;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use floorsync_core::{Config, Coordinator};

use crate::auth::SessionVerifier;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub verifier: Arc<dyn SessionVerifier>,
    pub config: Arc<Config>,
}

/// Create the HTTP router with all routes
pub fn create_router(
    coordinator: Coordinator,
    verifier: Arc<dyn SessionVerifier>,
    config: Arc<Config>,
) -> Router {
    let request_timeout = Duration::from_secs(config.server.request_timeout_seconds);

    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Skipping unparseable CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let state = AppState {
        coordinator,
        verifier,
        config,
    };

    let router = Router::new()
        // Health check endpoints (for monitoring probes)
        .merge(health::create_health_router())
        // WebSocket endpoint for connected operators
        .route("/api/ws", get(websocket::websocket_handler))
        // Relay ingress for the back office service
        .route("/internal/order-updated", post(internal::order_updated))
        .route(
            "/internal/notifications",
            post(internal::publish_notification),
        );

    // Apply layers before state
    let router = router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout));

    // Apply state to all routes (must be last)
    router.with_state(state)
}
