//! Session security manager.
//!
//! # Responsibilities
//! - Issue and verify short-lived access tokens
//! - Create, rotate and revoke refresh-backed sessions
//! - Register users and check credentials
//!
//! # Design Decisions
//! - Every store call is bounded by the configured store deadline
//! - Reasons for refusal are logged and counted, but callers only see
//!   [`SessionError::Unauthenticated`]
//! - Presenting a dead refresh secret revokes its session

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AuthConfig;
use crate::error::{AuthFailure, Result, SessionError, StoreError};
use crate::observability::metrics;
use crate::session::context::AuthContext;
use crate::session::password::{PasswordHasher, MIN_PASSWORD_LEN};
use crate::session::secrets::{generate_refresh_secret, hash_refresh_secret};
use crate::session::store::{SessionRecord, SessionStore, UserRecord, UserStore};
use crate::session::tokens::{IssuedAccessToken, TokenSigner, VerifiedAccess};

/// Result of [`SessionManager::create_session`].
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: String,
    /// Raw refresh secret. Hand it to the client and drop it.
    pub refresh_secret: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful [`SessionManager::refresh_session`].
#[derive(Debug, Clone)]
pub struct RotatedSession {
    pub session_id: String,
    pub refresh_secret: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
}

/// Both credentials for one session, ready to be set as cookies.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub session_id: String,
    pub access: IssuedAccessToken,
    pub refresh_secret: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Public part of a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<UserRecord> for UserProfile {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.user_id,
            name: user.name,
            email: user.email,
        }
    }
}

/// What the client learns about its session. Never carries token material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub user: UserProfile,
}

pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    signer: TokenSigner,
    hasher: PasswordHasher,
    refresh_ttl: chrono::Duration,
    store_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        config: &AuthConfig,
        store_timeout: Duration,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
    ) -> Result<Self> {
        let signer = TokenSigner::new(
            config.jwt_secret.as_bytes(),
            config.issuer.clone(),
            chrono::Duration::seconds(config.access_ttl_secs as i64),
            config.leeway_secs,
        );
        let hasher = PasswordHasher::new(&config.password_hash)?;

        Ok(Self {
            sessions,
            users,
            signer,
            hasher,
            refresh_ttl: chrono::Duration::seconds(config.refresh_ttl_secs as i64),
            store_timeout,
        })
    }

    /// Lifetime of an access token.
    pub fn access_ttl(&self) -> chrono::Duration {
        self.signer.ttl()
    }

    pub fn sign_access_token(&self, user_id: &str, session_id: &str) -> Result<IssuedAccessToken> {
        self.signer.sign(user_id, session_id)
    }

    /// Structural check only. See [`SessionManager::authorize`] for the full one.
    pub fn verify_access_token(&self, token: &str) -> Result<VerifiedAccess> {
        self.signer.verify(token).map_err(reject)
    }

    /// Resolve a live session to its user id.
    pub async fn validate_session(&self, session_id: &str) -> Result<String> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(reject(AuthFailure::SessionNotFound));
        }

        let record = self
            .bounded("find_by_id", self.sessions.find_by_id(session_id))
            .await?
            .ok_or_else(|| reject(AuthFailure::SessionNotFound))?;

        if record.revoked {
            return Err(reject(AuthFailure::SessionRevoked));
        }
        if record.is_expired_at(Utc::now()) {
            return Err(reject(AuthFailure::SessionExpired));
        }
        Ok(record.user_id)
    }

    /// Verify an access token and the session behind it.
    pub async fn authorize(&self, token: &str) -> Result<AuthContext> {
        let verified = self.verify_access_token(token)?;
        let owner = self.validate_session(&verified.session_id).await?;

        if owner != verified.user_id {
            tracing::warn!(
                session_id = %verified.session_id,
                token_subject = %verified.user_id,
                "Access token subject does not own its session"
            );
            return Err(reject(AuthFailure::SubjectMismatch));
        }

        Ok(AuthContext {
            user_id: verified.user_id,
            session_id: verified.session_id,
        })
    }

    pub async fn create_session(&self, user_id: &str) -> Result<NewSession> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(SessionError::InvalidInput("invalid user id".into()));
        }

        let refresh_secret = generate_refresh_secret();
        let record = SessionRecord {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            refresh_token_hash: hash_refresh_secret(&refresh_secret),
            expires_at: Utc::now() + self.refresh_ttl,
            revoked: false,
        };
        let session = NewSession {
            session_id: record.session_id.clone(),
            refresh_secret,
            expires_at: record.expires_at,
        };

        self.bounded("create", self.sessions.create(record)).await?;

        metrics::record_session_event("create");
        tracing::debug!(session_id = %session.session_id, user_id, "Session created");
        Ok(session)
    }

    /// Create a session and sign its first access token.
    pub async fn issue_credentials(&self, user_id: &str) -> Result<IssuedCredentials> {
        let session = self.create_session(user_id).await?;
        let access = self.sign_access_token(user_id, &session.session_id)?;
        Ok(IssuedCredentials {
            session_id: session.session_id,
            access,
            refresh_secret: session.refresh_secret,
            refresh_expires_at: session.expires_at,
        })
    }

    /// Exchange a refresh secret for a new one. Each secret rotates at most once.
    pub async fn refresh_session(&self, raw_secret: &str) -> Result<RotatedSession> {
        let raw_secret = raw_secret.trim();
        if raw_secret.is_empty() {
            return Err(reject(AuthFailure::InvalidRefreshToken));
        }

        let presented = hash_refresh_secret(raw_secret);
        let record = self
            .bounded("find_by_hash", self.sessions.find_by_hash(&presented))
            .await?
            .ok_or_else(|| reject(AuthFailure::InvalidRefreshToken))?;

        let now = Utc::now();
        if !record.is_live_at(now) {
            let failure = if record.revoked {
                AuthFailure::SessionRevoked
            } else {
                AuthFailure::SessionExpired
            };
            tracing::warn!(
                session_id = %record.session_id,
                reason = failure.as_str(),
                "Dead refresh token presented, revoking session"
            );
            // The request is refused either way; a failed revoke is only logged.
            if let Err(e) = self
                .bounded("mark_revoked", self.sessions.mark_revoked(&record.session_id))
                .await
            {
                tracing::error!(session_id = %record.session_id, error = %e, "Failed to poison session");
            }
            return Err(reject(failure));
        }

        let refresh_secret = generate_refresh_secret();
        let expires_at = now + self.refresh_ttl;
        let swapped = self
            .bounded(
                "replace_hash",
                self.sessions.replace_hash(
                    &record.session_id,
                    &presented,
                    &hash_refresh_secret(&refresh_secret),
                    expires_at,
                ),
            )
            .await?;

        if !swapped {
            // Lost the race to a concurrent rotation of the same secret.
            return Err(reject(AuthFailure::InvalidRefreshToken));
        }

        metrics::record_session_event("refresh");
        tracing::debug!(session_id = %record.session_id, "Session rotated");
        Ok(RotatedSession {
            session_id: record.session_id,
            refresh_secret,
            expires_at,
            user_id: record.user_id,
        })
    }

    /// Mark a session revoked. Revoking twice is not an error.
    pub async fn revoke_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(SessionError::InvalidInput("invalid session id".into()));
        }

        let found = self
            .bounded("mark_revoked", self.sessions.mark_revoked(session_id))
            .await?;
        if !found {
            return Err(SessionError::NotFound);
        }

        metrics::record_session_event("revoke");
        tracing::debug!(session_id, "Session revoked");
        Ok(())
    }

    pub async fn register_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSnapshot> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidInput("name is required".into()));
        }
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(SessionError::InvalidInput("valid email is required".into()));
        }
        let password = password.trim();
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SessionError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let password_hash = self.hasher.hash(password.to_string()).await?;
        let user = UserRecord {
            user_id: uuid::Uuid::new_v4().to_string(),
            email,
            name: name.to_string(),
            password_hash,
            created_at: Utc::now(),
        };

        self.bounded("insert_user", self.users.insert(user.clone()))
            .await
            .map_err(|e| match e {
                SessionError::Conflict(_) => SessionError::Conflict("email already exists".into()),
                other => other,
            })?;

        metrics::record_session_event("register");
        tracing::info!(user_id = %user.user_id, "User registered");
        Ok(AuthSnapshot { user: user.into() })
    }

    /// Check an email/password pair. Unknown emails cost as much as wrong passwords.
    pub async fn authenticate_user(&self, email: &str, password: &str) -> Result<AuthSnapshot> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(SessionError::InvalidInput(
                "email and password are required".into(),
            ));
        }
        let password = password.trim().to_string();

        let user = match self
            .bounded("find_by_email", self.users.find_by_email(&email))
            .await?
        {
            Some(user) => user,
            None => {
                self.hasher.verify_dummy(password).await;
                return Err(reject(AuthFailure::BadCredentials));
            }
        };

        if !self
            .hasher
            .verify(password, user.password_hash.clone())
            .await?
        {
            return Err(reject(AuthFailure::BadCredentials));
        }

        metrics::record_session_event("login");
        Ok(AuthSnapshot { user: user.into() })
    }

    /// Snapshot for an already authorized caller.
    pub async fn auth_snapshot(&self, user_id: &str) -> Result<AuthSnapshot> {
        let user = self
            .bounded("find_user", self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| reject(AuthFailure::SessionNotFound))?;
        Ok(AuthSnapshot { user: user.into() })
    }

    async fn bounded<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StoreError::Conflict(msg))) => {
                tracing::debug!(op, conflict = %msg, "Store conflict");
                Err(SessionError::Conflict(msg))
            }
            Ok(Err(e)) => {
                tracing::error!(op, error = %e, "Store call failed");
                Err(e.into())
            }
            Err(_) => {
                tracing::error!(op, timeout = ?self.store_timeout, "Store call timed out");
                Err(StoreError::Timeout.into())
            }
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn reject(failure: AuthFailure) -> SessionError {
    metrics::record_auth_failure(failure.as_str());
    tracing::debug!(reason = failure.as_str(), "Authentication refused");
    SessionError::Unauthenticated(failure)
}
