//! Store contracts for sessions and credentials.
//!
//! Implementations must make [`SessionStore::replace_hash`] a single atomic
//! compare-and-replace: of two callers presenting the same expected hash,
//! exactly one may observe `true`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Persisted session, bound to one user and one live refresh secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    /// SHA-256 hex of the current refresh secret.
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

/// Stored credential for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    /// Lower-cased.
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError>;

    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn find_by_hash(&self, refresh_hash: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Swap the refresh hash and expiry if the session still carries
    /// `expected_hash` and is not revoked. Returns whether the swap happened.
    async fn replace_hash(
        &self,
        session_id: &str,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Set `revoked`. Returns `false` when no such session exists.
    async fn mark_revoked(&self, session_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn insert(&self, user: UserRecord) -> Result<(), StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;
}
