//! Directory records owned by external member/restaurant services

use serde::{Deserialize, Serialize};

/// Member identity as seen by the waitlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub nickname: String,
}

/// Restaurant identity, owner and local timezone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    /// IANA timezone name; the admission day rolls over at local midnight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Restaurant {
    pub fn is_owned_by(&self, member_id: i64) -> bool {
        self.owner_id == member_id
    }
}
