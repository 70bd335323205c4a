//! Access token signing and verification.
//!
//! # Responsibilities
//! - Mint HS256 access tokens carrying user id (`sub`) and session id (`jti`)
//! - Verify signature, algorithm, issuer and expiry with a small leeway
//!
//! # Design Decisions
//! - Verification is purely structural; session liveness is checked by the
//!   manager against the store
//! - Only HS256 is accepted, whatever the token header claims

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::error::{AuthFailure, SessionError};

/// Claims embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id.
    #[serde(default)]
    pub sub: String,
    /// Session id.
    #[serde(default)]
    pub jti: String,
    #[serde(default)]
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Identity extracted from a structurally valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAccess {
    pub user_id: String,
    pub session_id: String,
}

/// Signs and verifies access tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration, leeway_secs: u64) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer,
            ttl,
        }
    }

    /// Access token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `user_id` / `session_id`, valid for the configured TTL.
    pub fn sign(&self, user_id: &str, session_id: &str) -> Result<IssuedAccessToken, SessionError> {
        self.sign_at(user_id, session_id, Utc::now())
    }

    fn sign_at(
        &self,
        user_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedAccessToken, SessionError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(SessionError::InvalidInput("invalid user id".into()));
        }
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(SessionError::InvalidInput("invalid session id".into()));
        }

        let expires_at = now + self.ttl;
        let claims = AccessClaims {
            sub: user_id.to_string(),
            jti: session_id.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::Internal(format!("jwt signing: {e}")))?;

        // Round down to whole seconds, as carried in the token.
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(expires_at);

        Ok(IssuedAccessToken { token, expires_at })
    }

    /// Check signature, algorithm, issuer and expiry; return the embedded ids.
    pub fn verify(&self, token: &str) -> Result<VerifiedAccess, AuthFailure> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthFailure::MissingToken);
        }

        let data = decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| classify(e.kind()))?;

        let user_id = data.claims.sub.trim();
        let session_id = data.claims.jti.trim();
        if user_id.is_empty() || session_id.is_empty() {
            return Err(AuthFailure::MissingClaims);
        }

        Ok(VerifiedAccess {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        })
    }
}

fn classify(kind: &ErrorKind) -> AuthFailure {
    match kind {
        ErrorKind::ExpiredSignature => AuthFailure::ExpiredToken,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthFailure::BadSignature,
        ErrorKind::MissingRequiredClaim(_) | ErrorKind::InvalidIssuer => AuthFailure::MissingClaims,
        _ => AuthFailure::MalformedToken,
    }
}
