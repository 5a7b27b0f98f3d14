//! HTTP surface: device API, admin API, real-time WebSocket channel, and
//! the ambient `/healthz` + `/metrics` routes, composed into one router.

pub mod admin;
pub mod device;
pub mod security;
pub mod ws;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> (axum::http::StatusCode, Vec<u8>) {
    (axum::http::StatusCode::OK, crate::telemetry::render())
}

pub fn router(state: AppState) -> Router {
    let read_timeout = state.settings.server.read_timeout;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .merge(device::router())
        .merge(admin::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(tower_http::timeout::TimeoutLayer::new(read_timeout))
        .with_state(state)
}
