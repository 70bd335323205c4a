//! HTTP mapping of session and validation errors.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{AuthFailure, SessionError};

/// Error returned by handlers and middleware.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(AuthFailure),
    /// Refresh endpoint called without its cookie.
    RefreshRequired,
    NotFound,
    Conflict(String),
    /// Detail is logged, never returned.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) | ApiError::RefreshRequired => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Client-facing text for a refusal. Token and session failures share one
/// message so callers cannot tell which check failed.
fn unauthorized_message(failure: AuthFailure) -> &'static str {
    match failure {
        AuthFailure::MissingToken => "authentication required",
        AuthFailure::BadCredentials => "invalid credentials",
        AuthFailure::InvalidRefreshToken => "invalid refresh token",
        _ => "invalid or expired token",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, code) = match &self {
            ApiError::BadRequest(msg) | ApiError::Conflict(msg) => (msg.as_str(), None),
            ApiError::Unauthorized(failure) => (unauthorized_message(*failure), failure.code()),
            ApiError::RefreshRequired => ("refresh token required", None),
            ApiError::NotFound => ("session not found", None),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                ("internal server error", None)
            }
        };

        (status, Json(ErrorBody { message, code })).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidInput(msg) => ApiError::BadRequest(msg),
            SessionError::Unauthenticated(failure) => ApiError::Unauthorized(failure),
            SessionError::NotFound => ApiError::NotFound,
            SessionError::Conflict(msg) => ApiError::Conflict(msg),
            SessionError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

/// Undecodable bodies get a fixed message; the parser detail stays in the log.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
        ApiError::BadRequest("invalid request body".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_token_failures_share_message() {
        let (status, a) = body_json(ApiError::Unauthorized(AuthFailure::BadSignature)).await;
        let (_, b) = body_json(ApiError::Unauthorized(AuthFailure::SessionRevoked)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(a, b);
        assert_eq!(a["code"], "token_expired");
    }

    #[tokio::test]
    async fn test_missing_token_code() {
        let (_, body) = body_json(ApiError::Unauthorized(AuthFailure::MissingToken)).await;
        assert_eq!(body["code"], "token_missing");
    }

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let (status, body) = body_json(ApiError::Internal("pool exhausted".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "message": "internal server error" }));
    }

    #[test]
    fn test_session_error_mapping() {
        let err: ApiError = SessionError::Conflict("email already exists".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err: ApiError = SessionError::InvalidInput("name is required".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err: ApiError = SessionError::NotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
