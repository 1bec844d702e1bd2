//! Caller identity
//!
//! Authentication itself happens upstream; requests arrive with the
//! authenticated member id in the `X-Member-Id` header.

mod extractor;
mod middleware;

pub use middleware::{is_public_path, require_member};

/// Header carrying the authenticated member id
pub const MEMBER_ID_HEADER: &str = "x-member-id";

/// Member acting on the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentMember {
    pub id: i64,
}

impl CurrentMember {
    /// Parse the identity header value
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(|id| Self { id })
    }
}
