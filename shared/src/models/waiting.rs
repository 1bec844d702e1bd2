//! Waiting Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Waiting entry status
///
/// ```text
/// Waiting ──call──▶ Called ──seat────▶ Seated
///    │                 └────no-show──▶ NoShow
///    └──cancel──▶ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitingStatus {
    Waiting,
    Called,
    Seated,
    Cancelled,
    NoShow,
}

impl WaitingStatus {
    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(self, next: WaitingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Called)
                | (Self::Waiting, Self::Cancelled)
                | (Self::Called, Self::Seated)
                | (Self::Called, Self::NoShow)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Seated | Self::Cancelled | Self::NoShow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Called => "CALLED",
            Self::Seated => "SEATED",
            Self::Cancelled => "CANCELLED",
            Self::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for WaitingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admission unit in a restaurant's seating queue
///
/// `waiting_number` is assigned once per (restaurant, admission day) and never reused.
/// `admission_day` is the restaurant-local calendar day encoded as `YYYYMMDD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingEntry {
    pub id: i64,
    pub restaurant_id: i64,
    pub member_id: i64,
    pub waiting_number: u32,
    pub guest_count: u32,
    pub estimated_wait_minutes: u32,
    pub status: WaitingStatus,
    pub admission_day: u32,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_at: Option<i64>,
}

impl WaitingEntry {
    pub fn is_waiting(&self) -> bool {
        self.status == WaitingStatus::Waiting
    }
}

/// One row of an entry's status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// `None` for the admission record
    pub from: Option<WaitingStatus>,
    pub to: WaitingStatus,
    pub actor_id: i64,
    pub at: i64,
}

/// Create waiting payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingCreate {
    pub restaurant_id: i64,
    pub guest_count: i32,
}

/// Waiting entry enriched with directory names (list/detail views)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingResponse {
    pub id: i64,
    pub member_id: i64,
    pub member_nickname: String,
    pub restaurant_id: i64,
    pub restaurant_name: String,
    pub waiting_number: u32,
    pub guest_count: u32,
    pub estimated_wait_minutes: u32,
    pub status: WaitingStatus,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_at: Option<i64>,
}

impl WaitingResponse {
    pub fn from_entry(
        entry: &WaitingEntry,
        member_nickname: impl Into<String>,
        restaurant_name: impl Into<String>,
    ) -> Self {
        Self {
            id: entry.id,
            member_id: entry.member_id,
            member_nickname: member_nickname.into(),
            restaurant_id: entry.restaurant_id,
            restaurant_name: restaurant_name.into(),
            waiting_number: entry.waiting_number,
            guest_count: entry.guest_count,
            estimated_wait_minutes: entry.estimated_wait_minutes,
            status: entry.status,
            created_at: entry.created_at,
            called_at: entry.called_at,
        }
    }
}

/// Current queue size of a restaurant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingCount {
    pub restaurant_id: i64,
    pub waiting_count: u32,
}
