//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::MemberNotFound
            | Self::RestaurantNotFound
            | Self::WaitingNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::InvalidWaitingTransition => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated | Self::IdentityInvalid => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            Self::PermissionDenied | Self::OwnerRequired => StatusCode::FORBIDDEN,

            // 500 Internal Server Error
            Self::Unknown | Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request
            Self::ValidationFailed | Self::InvalidRequest | Self::InvalidGuestCount => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}
