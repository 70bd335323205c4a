//! SQLx (Postgres) implementation of the session and credential stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::session::store::{SessionRecord, SessionStore, UserRecord, UserStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS app_users (
        id            TEXT PRIMARY KEY,
        email         TEXT NOT NULL UNIQUE,
        name          TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS session_tokens (
        id                 TEXT PRIMARY KEY,
        user_id            TEXT NOT NULL REFERENCES app_users(id) ON DELETE CASCADE,
        refresh_token_hash TEXT NOT NULL UNIQUE,
        expires_at         TIMESTAMPTZ NOT NULL,
        revoked            BOOLEAN NOT NULL DEFAULT FALSE,
        created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS session_tokens_user_id_idx ON session_tokens (user_id)",
];

/// Open a connection pool.
pub async fn connect(config: &DatabaseConfig, url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

/// Create the session and user tables if they are missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    refresh_token_hash: String,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.id,
            user_id: row.user_id,
            refresh_token_hash: row.refresh_token_hash,
            expires_at: row.expires_at,
            revoked: row.revoked,
        }
    }
}

/// Session store over the `session_tokens` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[tracing::instrument(skip(self, record), fields(session_id = %record.session_id))]
    async fn create(&self, record: SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO session_tokens (id, user_id, refresh_token_hash, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.user_id)
        .bind(&record.refresh_token_hash)
        .bind(record.expires_at)
        .bind(record.revoked)
        .execute(&self.pool)
        .await
        .map_err(map_unique("session already exists"))?;
        Ok(())
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, refresh_token_hash, expires_at, revoked
              FROM session_tokens
             WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_hash(&self, refresh_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, refresh_token_hash, expires_at, revoked
              FROM session_tokens
             WHERE refresh_token_hash = $1
            "#,
        )
        .bind(refresh_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    #[tracing::instrument(skip(self, expected_hash, new_hash))]
    async fn replace_hash(
        &self,
        session_id: &str,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Single statement: the row lock taken by UPDATE serialises racing
        // rotations and the hash predicate lets only the first one through.
        let result = sqlx::query(
            r#"
            UPDATE session_tokens
               SET refresh_token_hash = $1,
                   expires_at = $2,
                   revoked = FALSE
             WHERE id = $3
               AND refresh_token_hash = $4
               AND revoked = FALSE
            "#,
        )
        .bind(new_hash)
        .bind(expires_at)
        .bind(session_id)
        .bind(expected_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_revoked(&self, session_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE session_tokens SET revoked = TRUE WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

/// Credential store over the `app_users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[tracing::instrument(skip(self, user), fields(user_id = %user.user_id))]
    async fn insert(&self, user: UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO app_users (id, email, name, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique("email already exists"))?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, created_at
              FROM app_users
             WHERE LOWER(email) = $1
             LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, name, password_hash, created_at
              FROM app_users
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}

fn map_unique(conflict: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(conflict.to_string())
        }
        _ => {
            tracing::error!(error = %e, "Database write failed");
            StoreError::Database(e)
        }
    }
}
