//! Caller identity.
//!
//! Authentication happens upstream; the authenticated user id arrives in the
//! `x-user-id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use linkwire_core::UserId;

use super::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor for the authenticated user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(UserId::from(v)))
            .ok_or(ApiError::Unauthorized)
    }
}
