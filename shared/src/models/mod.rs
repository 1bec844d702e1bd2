//! Data models
//!
//! Shared between waitlist-server and its clients (via API).
//! All IDs are `i64`; timestamps are UTC milliseconds.

pub mod directory;
pub mod page;
pub mod waiting;

// Re-exports
pub use directory::*;
pub use page::*;
pub use waiting::*;
