//! Shared types for the waitlist service
//!
//! Error codes, response envelope, domain models and real-time
//! message payloads used by the server and its clients.

pub mod error;
pub mod message;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
