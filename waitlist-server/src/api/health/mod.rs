//! Health routes
//!
//! | Path | Method | Meaning | Identity |
//! |------|--------|---------|----------|
//! | /health | GET | liveness | none |
//! | /health/detailed | GET | liveness plus runtime counters | none |
//!
//! ```json
//! { "status": "ok", "version": "0.1.0" }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;

/// Public router
pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed_health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    /// ok | error
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    /// Open member and restaurant channels
    channels: usize,
    members: usize,
    restaurants: usize,
    /// Restaurants with at least one Waiting entry
    active_queues: usize,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health/detailed
pub async fn detailed_health(State(state): State<ServerState>) -> Json<DetailedHealthResponse> {
    let (status, active_queues) = match state.coordinator.ledger().restaurants_with_waiting() {
        Ok(set) => ("ok", set.len()),
        Err(e) => {
            tracing::error!(error = %e, "Ledger unreadable during health check");
            ("error", 0)
        }
    };

    Json(DetailedHealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        channels: state.coordinator.gateway().channel_count(),
        members: state.directory.member_count(),
        restaurants: state.directory.restaurant_count(),
        active_queues,
    })
}
