//! Unified error codes for the waitlist service
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Directory errors (members, restaurants)
//! - 4xxx: Waiting errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 1xxx: Auth ====================
    /// Caller identity is missing
    NotAuthenticated = 1001,
    /// Caller identity is malformed
    IdentityInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Restaurant owner required
    OwnerRequired = 2002,

    // ==================== 3xxx: Directory ====================
    /// Member not found
    MemberNotFound = 3001,
    /// Restaurant not found
    RestaurantNotFound = 3002,

    // ==================== 4xxx: Waiting ====================
    /// Waiting entry not found
    WaitingNotFound = 4001,
    /// Status guard failed for the requested transition
    InvalidWaitingTransition = 4002,
    /// Guest count must be positive
    InvalidGuestCount = 4003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",

            // Auth
            ErrorCode::NotAuthenticated => "Member identity is required",
            ErrorCode::IdentityInvalid => "Member identity is invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::OwnerRequired => "Restaurant owner is required",

            // Directory
            ErrorCode::MemberNotFound => "Member not found",
            ErrorCode::RestaurantNotFound => "Restaurant not found",

            // Waiting
            ErrorCode::WaitingNotFound => "Waiting entry not found",
            ErrorCode::InvalidWaitingTransition => "Waiting entry is not in the required status",
            ErrorCode::InvalidGuestCount => "Guest count must be positive",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when converting an unknown u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1004 => Ok(ErrorCode::IdentityInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::OwnerRequired),

            // Directory
            3001 => Ok(ErrorCode::MemberNotFound),
            3002 => Ok(ErrorCode::RestaurantNotFound),

            // Waiting
            4001 => Ok(ErrorCode::WaitingNotFound),
            4002 => Ok(ErrorCode::InvalidWaitingTransition),
            4003 => Ok(ErrorCode::InvalidGuestCount),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
