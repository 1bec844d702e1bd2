//! Waitlist WebSocket endpoint
//!
//! GET /api/waitings/ws?memberId=<id>&restaurantId=<id>
//! Identity travels in the query string (browser WebSockets cannot set headers).
//!
//! Protocol:
//! - Server → client: `WaitlistFrame` (member notifications, restaurant counts, errors)
//! - Client → server: `WaitlistCommand` (Subscribe)
//!
//! On connect, and again after the member channel lags, the member's current
//! queue position is pushed so the client never has to poll.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::error::{AppError, ErrorCode};
use shared::message::{MemberNotification, WaitingCountUpdate, WaitlistCommand, WaitlistFrame};
use shared::util::now_millis;
use std::collections::BTreeSet;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::core::ServerState;
use crate::waitlist::WaitlistCoordinator;

/// Restaurant topics one connection may follow
const MAX_TOPICS_PER_CONNECTION: usize = 20;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    member_id: i64,
    restaurant_id: Option<i64>,
}

/// GET /api/waitings/ws
pub async fn handle_ws(
    State(state): State<ServerState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    if query.member_id <= 0 {
        return Err(AppError::with_message(
            ErrorCode::IdentityInvalid,
            "memberId must be a positive integer",
        ));
    }

    let topics: BTreeSet<i64> = query.restaurant_id.into_iter().collect();
    Ok(ws.on_upgrade(move |socket| waitlist_ws_session(socket, state, query.member_id, topics)))
}

async fn waitlist_ws_session(
    socket: WebSocket,
    state: ServerState,
    member_id: i64,
    initial_topics: BTreeSet<i64>,
) {
    let (mut sink, mut stream) = socket.split();
    let coordinator = state.coordinator.clone();

    tracing::info!(member_id, topics = initial_topics.len(), "Waitlist WS connected");

    let mut member_rx = coordinator.gateway().subscribe_member(member_id);

    let (topic_tx, mut topic_rx) = mpsc::channel::<WaitingCountUpdate>(64);
    let mut forwarders = spawn_forwarders(&coordinator, &initial_topics, &topic_tx);

    if send_position_snapshot(&mut sink, &coordinator, member_id)
        .await
        .is_err()
        || send_counts(&mut sink, &coordinator, &initial_topics)
            .await
            .is_err()
    {
        abort_all(forwarders);
        return;
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // skip immediate

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }

            event = member_rx.recv() => {
                match event {
                    Ok(notification) => {
                        if send_frame(&mut sink, &WaitlistFrame::Member { notification }).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(member_id, lagged = n, "Member subscriber lagged, resending position");
                        member_rx = coordinator.gateway().subscribe_member(member_id);
                        if send_position_snapshot(&mut sink, &coordinator, member_id).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            update = topic_rx.recv() => {
                let Some(update) = update else { break };
                if send_frame(&mut sink, &WaitlistFrame::Restaurant { update }).await.is_err() {
                    break;
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WaitlistCommand>(&text) {
                            Ok(WaitlistCommand::Subscribe { restaurant_ids }) => {
                                let topics: BTreeSet<i64> = restaurant_ids.into_iter().collect();
                                if topics.len() > MAX_TOPICS_PER_CONNECTION {
                                    let frame = WaitlistFrame::Error {
                                        message: format!(
                                            "Too many restaurants ({}/{MAX_TOPICS_PER_CONNECTION})",
                                            topics.len()
                                        ),
                                    };
                                    if send_frame(&mut sink, &frame).await.is_err() {
                                        break;
                                    }
                                    continue;
                                }

                                abort_all(std::mem::take(&mut forwarders));
                                forwarders = spawn_forwarders(&coordinator, &topics, &topic_tx);
                                tracing::debug!(member_id, topics = topics.len(), "Topic subscription replaced");
                                if send_counts(&mut sink, &coordinator, &topics).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let frame = WaitlistFrame::Error {
                                    message: format!("Unrecognized command: {e}"),
                                };
                                if send_frame(&mut sink, &frame).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    abort_all(forwarders);
    tracing::info!(member_id, "Waitlist WS disconnected");
}

/// One task per restaurant topic, feeding the session's merged channel
fn spawn_forwarders(
    coordinator: &WaitlistCoordinator,
    topics: &BTreeSet<i64>,
    tx: &mpsc::Sender<WaitingCountUpdate>,
) -> Vec<JoinHandle<()>> {
    topics
        .iter()
        .map(|&restaurant_id| {
            tokio::spawn(forward_topic(
                coordinator.clone(),
                restaurant_id,
                tx.clone(),
            ))
        })
        .collect()
}

async fn forward_topic(
    coordinator: WaitlistCoordinator,
    restaurant_id: i64,
    tx: mpsc::Sender<WaitingCountUpdate>,
) {
    let mut rx = coordinator.gateway().subscribe_restaurant(restaurant_id);
    loop {
        match rx.recv().await {
            Ok(update) => {
                if tx.send(update).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(restaurant_id, lagged = n, "Topic subscriber lagged, resending count");
                rx = coordinator.gateway().subscribe_restaurant(restaurant_id);
                if let Some(update) = current_count(&coordinator, restaurant_id).await
                    && tx.send(update).await.is_err()
                {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn abort_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        handle.abort();
    }
}

async fn current_count(
    coordinator: &WaitlistCoordinator,
    restaurant_id: i64,
) -> Option<WaitingCountUpdate> {
    match coordinator.get_waiting_count(restaurant_id).await {
        Ok(count) => Some(WaitingCountUpdate {
            restaurant_id,
            waiting_count: count.waiting_count,
            timestamp: now_millis(),
        }),
        Err(e) => {
            tracing::debug!(restaurant_id, error = %e, "No count for subscribed restaurant");
            None
        }
    }
}

async fn send_position_snapshot<S>(
    sink: &mut S,
    coordinator: &WaitlistCoordinator,
    member_id: i64,
) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    match coordinator.my_queue_position(member_id).await {
        Ok(Some(update)) => {
            let frame = WaitlistFrame::Member {
                notification: MemberNotification::WaitingQueueUpdate(update),
            };
            send_frame(sink, &frame).await
        }
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::warn!(member_id, error = %e, "Position snapshot unavailable");
            Ok(())
        }
    }
}

async fn send_counts<S>(
    sink: &mut S,
    coordinator: &WaitlistCoordinator,
    topics: &BTreeSet<i64>,
) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    for &restaurant_id in topics {
        if let Some(update) = current_count(coordinator, restaurant_id).await {
            send_frame(sink, &WaitlistFrame::Restaurant { update }).await?;
        }
    }
    Ok(())
}

async fn send_frame<S>(sink: &mut S, frame: &WaitlistFrame) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
