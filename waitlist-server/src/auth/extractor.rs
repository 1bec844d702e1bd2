use axum::{extract::FromRequestParts, http::request::Parts};
use shared::error::{AppError, ErrorCode};

use super::{CurrentMember, MEMBER_ID_HEADER};
use crate::core::ServerState;

/// Takes the identity injected by the middleware, or parses the header
/// when the route is public
impl FromRequestParts<ServerState> for CurrentMember {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(member) = parts.extensions.get::<CurrentMember>() {
            return Ok(*member);
        }

        let raw = parts
            .headers
            .get(MEMBER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(AppError::not_authenticated)?;

        let member = CurrentMember::parse(raw).ok_or_else(|| {
            AppError::with_message(ErrorCode::IdentityInvalid, "Invalid X-Member-Id header")
        })?;
        parts.extensions.insert(member);
        Ok(member)
    }
}
