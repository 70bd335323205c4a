//! Identity attached to authenticated requests.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AuthFailure;
use crate::http::error::ApiError;

/// Caller identity resolved by the authentication middleware and stored in
/// request extensions for handlers and the admission layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub session_id: String,
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(ApiError::Unauthorized(AuthFailure::MissingToken))
    }
}
