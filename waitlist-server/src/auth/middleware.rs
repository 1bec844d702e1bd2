use axum::{extract::Request, middleware::Next, response::Response};
use shared::error::{AppError, ErrorCode};

use super::{CurrentMember, MEMBER_ID_HEADER};

/// Routes reachable without an identity header
///
/// The WebSocket carries its member id in the query string.
pub fn is_public_path(path: &str) -> bool {
    path == "/api/waitings/ws"
        || (path.starts_with("/api/waitings/restaurant/") && path.ends_with("/count"))
}

/// Identity middleware
///
/// Reads `X-Member-Id` and injects [`CurrentMember`] into the request
/// extensions.
///
/// # Skipped
///
/// - `OPTIONS *` (CORS preflight)
/// - non `/api/` paths
/// - [`is_public_path`] routes
///
/// | Failure | Status |
/// |---------|--------|
/// | header missing | 401 NotAuthenticated |
/// | header not a positive integer | 401 IdentityInvalid |
pub async fn require_member(mut req: Request, next: Next) -> Result<Response, AppError> {
    let path = req.uri().path();

    if req.method() == http::Method::OPTIONS || !path.starts_with("/api/") || is_public_path(path)
    {
        return Ok(next.run(req).await);
    }

    let raw = match req.headers().get(MEMBER_ID_HEADER) {
        Some(value) => value.to_str().unwrap_or_default(),
        None => {
            tracing::warn!(uri = %req.uri(), "Request without member identity");
            return Err(AppError::not_authenticated());
        }
    };

    let member = CurrentMember::parse(raw).ok_or_else(|| {
        AppError::with_message(ErrorCode::IdentityInvalid, "Invalid X-Member-Id header")
    })?;

    req.extensions_mut().insert(member);
    Ok(next.run(req).await)
}
