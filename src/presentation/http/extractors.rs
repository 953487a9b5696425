//! Custom Extractors
//!
//! Axum extractors for caller identity and request parsing.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::shared::error::AppError;

/// Header carrying the caller identity, set by the upstream auth proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity taken from the `x-user-id` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".into()))?;

        Ok(CurrentUser {
            user_id: user_id.to_string(),
        })
    }
}

/// Parse a UUID path segment, answering 400 instead of axum's plain-text rejection.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {} ID", what)))
}
