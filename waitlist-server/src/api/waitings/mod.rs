//! Waiting API
//!
//! | Method | Path | Who |
//! |--------|------|-----|
//! | POST | /api/waitings | member |
//! | GET | /api/waitings/my | member |
//! | GET | /api/waitings/my/position | member |
//! | GET | /api/waitings/restaurant/{restaurant_id} | anyone identified |
//! | GET | /api/waitings/restaurant/{restaurant_id}/count | public |
//! | GET | /api/waitings/{id} | entry member or owner |
//! | GET | /api/waitings/{id}/history | entry member or owner |
//! | PATCH | /api/waitings/{id}/call | owner |
//! | PATCH | /api/waitings/{id}/seat | owner |
//! | PATCH | /api/waitings/{id}/no-show | owner |
//! | DELETE | /api/waitings/{id} | entry member |
//! | GET | /api/waitings/ws | WebSocket, identity in query |

mod handler;
mod ws;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/waitings", routes())
}

fn routes() -> Router<ServerState> {
    let member_routes = Router::new()
        .route("/", post(handler::create))
        .route("/my", get(handler::list_mine))
        .route("/my/position", get(handler::my_position))
        .route("/{id}", get(handler::get_by_id).delete(handler::cancel))
        .route("/{id}/history", get(handler::history));

    let owner_routes = Router::new()
        .route("/{id}/call", patch(handler::call))
        .route("/{id}/seat", patch(handler::seat))
        .route("/{id}/no-show", patch(handler::no_show));

    let restaurant_routes = Router::new()
        .route("/restaurant/{restaurant_id}", get(handler::list_for_restaurant))
        .route("/restaurant/{restaurant_id}/count", get(handler::count));

    member_routes
        .merge(owner_routes)
        .merge(restaurant_routes)
        .route("/ws", get(ws::handle_ws))
}
