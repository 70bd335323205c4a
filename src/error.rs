//! Error types shared by the session and admission subsystems.

use thiserror::Error;

/// Failures raised by a session or credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store call exceeded its deadline")]
    Timeout,
}

/// Why an authentication attempt was refused.
///
/// Kept internal: clients only ever see the collapsed message and code
/// from [`AuthFailure::code`], while logs and metrics get [`AuthFailure::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    MalformedToken,
    BadSignature,
    ExpiredToken,
    MissingClaims,
    SessionNotFound,
    SessionRevoked,
    SessionExpired,
    SubjectMismatch,
    BadCredentials,
    InvalidRefreshToken,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "missing_token",
            AuthFailure::MalformedToken => "malformed_token",
            AuthFailure::BadSignature => "bad_signature",
            AuthFailure::ExpiredToken => "expired_token",
            AuthFailure::MissingClaims => "missing_claims",
            AuthFailure::SessionNotFound => "session_not_found",
            AuthFailure::SessionRevoked => "session_revoked",
            AuthFailure::SessionExpired => "session_expired",
            AuthFailure::SubjectMismatch => "subject_mismatch",
            AuthFailure::BadCredentials => "bad_credentials",
            AuthFailure::InvalidRefreshToken => "invalid_refresh_token",
        }
    }

    /// Client-facing hint: `token_missing` means "log in", anything else
    /// about an access token means "call refresh".
    pub fn code(&self) -> Option<&'static str> {
        match self {
            AuthFailure::MissingToken => Some("token_missing"),
            AuthFailure::BadCredentials | AuthFailure::InvalidRefreshToken => None,
            _ => Some("token_expired"),
        }
    }
}

/// Error taxonomy of the session security manager.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthenticated: {}", .0.as_str())]
    Unauthenticated(AuthFailure),

    #[error("session not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => SessionError::Conflict(msg),
            other => SessionError::Internal(other.to_string()),
        }
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_failures_collapse_to_expired_code() {
        for failure in [
            AuthFailure::MalformedToken,
            AuthFailure::BadSignature,
            AuthFailure::ExpiredToken,
            AuthFailure::SessionRevoked,
            AuthFailure::SubjectMismatch,
        ] {
            assert_eq!(failure.code(), Some("token_expired"));
        }
        assert_eq!(AuthFailure::MissingToken.code(), Some("token_missing"));
        assert_eq!(AuthFailure::BadCredentials.code(), None);
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: SessionError = StoreError::Conflict("email already exists".into()).into();
        assert!(matches!(err, SessionError::Conflict(_)));

        let err: SessionError = StoreError::Timeout.into();
        assert!(matches!(err, SessionError::Internal(_)));
    }
}
