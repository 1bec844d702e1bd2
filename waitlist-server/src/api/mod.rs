//! HTTP / WebSocket boundary

pub mod health;
pub mod waitings;

use axum::{Router, middleware};
use tower_http::cors::CorsLayer;

use crate::auth::require_member;
use crate::core::ServerState;

async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let status = response.status();

    tracing::info!(target: "http_access", "{} {} {}", method, uri, status);

    response
}

/// Module routers, without state
pub fn routes() -> Router<ServerState> {
    Router::<ServerState>::new()
        .merge(health::router())
        .merge(waitings::router())
}

/// Fully layered application
pub fn build_app(state: ServerState) -> Router {
    routes()
        .layer(middleware::from_fn(require_member))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_request))
}
