//! Route Configuration
//!
//! Configures all HTTP routes for the API.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{create_cors_layer, create_trace_layer, track_http_metrics};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let cors = create_cors_layer(&state.settings.cors);

    Router::new()
        .nest("/api/v1", api_routes())
        // WebSocket gateway endpoint
        .route("/gateway", get(ws_handler))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_http_metrics))
        .layer(ServiceBuilder::new().layer(create_trace_layer()).layer(cors))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes, all identified by `x-user-id`
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/conversations", conversation_routes())
        .route("/messages", post(handlers::message::send_message))
}

/// Conversation routes
fn conversation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::conversation::list_conversations)
                .post(handlers::conversation::open_conversation),
        )
        .route("/{conversation_id}/messages", get(handlers::conversation::get_messages))
}
