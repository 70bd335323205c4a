//! In-process session and credential stores.
//!
//! Used by tests and by deployments without a database. Each store keeps
//! its tables behind one mutex so index and records always change together.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::session::store::{SessionRecord, SessionStore, UserRecord, UserStore};

#[derive(Default)]
struct SessionTables {
    by_id: HashMap<String, SessionRecord>,
    /// refresh hash -> session id
    by_hash: HashMap<String, String>,
}

/// Session store backed by a `HashMap`.
#[derive(Default)]
pub struct MemorySessionStore {
    tables: Mutex<SessionTables>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, revoked ones included.
    pub fn len(&self) -> usize {
        self.tables.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.by_id.contains_key(&record.session_id) {
            return Err(StoreError::Conflict(format!(
                "session {} already exists",
                record.session_id
            )));
        }
        tables
            .by_hash
            .insert(record.refresh_token_hash.clone(), record.session_id.clone());
        tables.by_id.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.tables.lock().by_id.get(session_id).cloned())
    }

    async fn find_by_hash(&self, refresh_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .by_hash
            .get(refresh_hash)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn replace_hash(
        &self,
        session_id: &str,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let SessionTables { by_id, by_hash } = &mut *tables;

        let Some(record) = by_id.get_mut(session_id) else {
            return Ok(false);
        };
        if record.revoked || record.refresh_token_hash != expected_hash {
            return Ok(false);
        }

        by_hash.remove(expected_hash);
        by_hash.insert(new_hash.to_string(), session_id.to_string());
        record.refresh_token_hash = new_hash.to_string();
        record.expires_at = expires_at;
        record.revoked = false;
        Ok(true)
    }

    async fn mark_revoked(&self, session_id: &str) -> Result<bool, StoreError> {
        match self.tables.lock().by_id.get_mut(session_id) {
            Some(record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Credential store backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.lock();
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email already exists".into()));
        }
        users.insert(user.user_id.clone(), user);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.lock().get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, hash: &str) -> SessionRecord {
        SessionRecord {
            session_id: id.into(),
            user_id: "user-1".into(),
            refresh_token_hash: hash.into(),
            expires_at: Utc::now() + Duration::days(7),
            revoked: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = MemorySessionStore::new();
        store.create(record("s1", "h1")).await.unwrap();

        assert_eq!(store.find_by_id("s1").await.unwrap().unwrap().refresh_token_hash, "h1");
        assert_eq!(store.find_by_hash("h1").await.unwrap().unwrap().session_id, "s1");
        assert!(store.find_by_hash("h2").await.unwrap().is_none());
        assert!(matches!(
            store.create(record("s1", "h9")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_hash_is_compare_and_swap() {
        let store = MemorySessionStore::new();
        store.create(record("s1", "h1")).await.unwrap();
        let later = Utc::now() + Duration::days(8);

        assert!(store.replace_hash("s1", "h1", "h2", later).await.unwrap());
        // Second caller with the stale hash loses.
        assert!(!store.replace_hash("s1", "h1", "h3", later).await.unwrap());

        assert!(store.find_by_hash("h1").await.unwrap().is_none());
        let current = store.find_by_hash("h2").await.unwrap().unwrap();
        assert_eq!(current.expires_at, later);
    }

    #[tokio::test]
    async fn test_revoked_session_cannot_rotate() {
        let store = MemorySessionStore::new();
        store.create(record("s1", "h1")).await.unwrap();

        assert!(store.mark_revoked("s1").await.unwrap());
        assert!(store.mark_revoked("s1").await.unwrap());
        assert!(!store.mark_revoked("missing").await.unwrap());
        assert!(!store
            .replace_hash("s1", "h1", "h2", Utc::now() + Duration::days(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_user_email_is_unique() {
        let store = MemoryUserStore::new();
        let user = UserRecord {
            user_id: "u1".into(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
            password_hash: "x".into(),
            created_at: Utc::now(),
        };
        store.insert(user.clone()).await.unwrap();

        let dup = UserRecord { user_id: "u2".into(), ..user };
        assert!(matches!(store.insert(dup).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.find_by_email("ada@example.com").await.unwrap().unwrap().user_id, "u1");
        assert!(store.find_by_id("u2").await.unwrap().is_none());
    }
}
