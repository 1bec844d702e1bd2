//! NotificationGateway: real-time fan-out
//!
//! ```text
//! WaitlistCoordinator / broadcast worker
//!       │ MemberNotification / WaitingCountUpdate
//!       ▼
//! NotificationGateway
//!   ├── members:     member_id → broadcast::Sender<MemberNotification>
//!   └── restaurants: restaurant_id → broadcast::Sender<WaitingCountUpdate>
//!         │
//!         ▼
//!   WebSocket sessions (subscribe → forward)
//! ```
//!
//! Delivery is at-most-once. A message sent while nobody listens is dropped;
//! the next broadcast carries the full state again.

use dashmap::DashMap;
use shared::message::{MemberNotification, WaitingCountUpdate};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Per-channel buffer
const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct NotificationGateway {
    members: Arc<DashMap<i64, broadcast::Sender<MemberNotification>>>,
    restaurants: Arc<DashMap<i64, broadcast::Sender<WaitingCountUpdate>>>,
}

impl NotificationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a member's private channel
    pub fn subscribe_member(&self, member_id: i64) -> broadcast::Receiver<MemberNotification> {
        self.members
            .entry(member_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to a restaurant topic
    pub fn subscribe_restaurant(
        &self,
        restaurant_id: i64,
    ) -> broadcast::Receiver<WaitingCountUpdate> {
        self.restaurants
            .entry(restaurant_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Point-to-point send; returns the number of receivers reached
    pub fn send_to_member(&self, member_id: i64, notification: MemberNotification) -> usize {
        match self.members.get(&member_id) {
            Some(tx) => tx.send(notification).unwrap_or(0),
            None => 0,
        }
    }

    /// Topic publish; returns the number of receivers reached
    pub fn publish_to_restaurant(&self, update: WaitingCountUpdate) -> usize {
        match self.restaurants.get(&update.restaurant_id) {
            Some(tx) => tx.send(update).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop channels nobody listens to; returns how many were removed
    pub fn prune_idle(&self) -> usize {
        let before = self.members.len() + self.restaurants.len();
        self.members.retain(|_, tx| tx.receiver_count() > 0);
        self.restaurants.retain(|_, tx| tx.receiver_count() > 0);
        before - (self.members.len() + self.restaurants.len())
    }

    pub fn channel_count(&self) -> usize {
        self.members.len() + self.restaurants.len()
    }
}
