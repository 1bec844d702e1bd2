//! Waiting API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use shared::error::AppResult;
use shared::message::QueuePositionUpdate;
use shared::models::{
    Page, PageRequest, StatusChange, WaitingCount, WaitingCreate, WaitingEntry, WaitingResponse,
};

use crate::auth::CurrentMember;
use crate::core::ServerState;

/// `?page=0&size=20`
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        PageRequest::new(query.page, query.size)
    }
}

/// POST /api/waitings - join a restaurant's queue
pub async fn create(
    State(state): State<ServerState>,
    member: CurrentMember,
    Json(payload): Json<WaitingCreate>,
) -> AppResult<Json<WaitingEntry>> {
    let entry = state
        .coordinator
        .create_waiting(member.id, payload.restaurant_id, payload.guest_count)
        .await?;
    Ok(Json(entry))
}

/// GET /api/waitings/my - own entries, newest first
pub async fn list_mine(
    State(state): State<ServerState>,
    member: CurrentMember,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<WaitingResponse>>> {
    let page = state
        .coordinator
        .list_my_waitings(member.id, query.into())
        .await?;
    Ok(Json(page))
}

/// GET /api/waitings/my/position - live rank, 204 when not waiting today
pub async fn my_position(
    State(state): State<ServerState>,
    member: CurrentMember,
) -> AppResult<Response> {
    let position: Option<QueuePositionUpdate> =
        state.coordinator.my_queue_position(member.id).await?;
    Ok(match position {
        Some(update) => Json(update).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// GET /api/waitings/restaurant/:restaurant_id
pub async fn list_for_restaurant(
    State(state): State<ServerState>,
    member: CurrentMember,
    Path(restaurant_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<WaitingResponse>>> {
    let page = state
        .coordinator
        .list_restaurant_waitings(restaurant_id, member.id, query.into())
        .await?;
    Ok(Json(page))
}

/// GET /api/waitings/restaurant/:restaurant_id/count
pub async fn count(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<i64>,
) -> AppResult<Json<WaitingCount>> {
    let count = state.coordinator.get_waiting_count(restaurant_id).await?;
    Ok(Json(count))
}

/// GET /api/waitings/:id
pub async fn get_by_id(
    State(state): State<ServerState>,
    member: CurrentMember,
    Path(id): Path<i64>,
) -> AppResult<Json<WaitingResponse>> {
    let waiting = state.coordinator.get_waiting(id, member.id).await?;
    Ok(Json(waiting))
}

/// GET /api/waitings/:id/history
pub async fn history(
    State(state): State<ServerState>,
    member: CurrentMember,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<StatusChange>>> {
    let history = state.coordinator.get_waiting_history(id, member.id).await?;
    Ok(Json(history))
}

/// PATCH /api/waitings/:id/call
pub async fn call(
    State(state): State<ServerState>,
    member: CurrentMember,
    Path(id): Path<i64>,
) -> AppResult<Json<WaitingEntry>> {
    let entry = state.coordinator.call(id, member.id).await?;
    Ok(Json(entry))
}

/// PATCH /api/waitings/:id/seat
pub async fn seat(
    State(state): State<ServerState>,
    member: CurrentMember,
    Path(id): Path<i64>,
) -> AppResult<Json<WaitingEntry>> {
    let entry = state.coordinator.seat(id, member.id).await?;
    Ok(Json(entry))
}

/// PATCH /api/waitings/:id/no-show
pub async fn no_show(
    State(state): State<ServerState>,
    member: CurrentMember,
    Path(id): Path<i64>,
) -> AppResult<Json<WaitingEntry>> {
    let entry = state.coordinator.no_show(id, member.id).await?;
    Ok(Json(entry))
}

/// DELETE /api/waitings/:id - leave the queue
pub async fn cancel(
    State(state): State<ServerState>,
    member: CurrentMember,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.coordinator.cancel(id, member.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
