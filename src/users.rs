//! Persistent user records.
//!
//! A user row keeps the identifiers that make the remote conversation
//! durable: the thread the user talks on, the knowledge store recorded for
//! them, and the values the assistant learned about them.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use tokio::sync::Mutex;

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserRecord {
    /// Primary key.
    pub id: i64,
    /// Stable identifier of the user on the chat platform.
    pub telegram_id: i64,
    pub thread_id: Option<String>,
    pub vector_store_id: Option<String>,
    pub values: Vec<String>,
}

/// Fields to overwrite on a user row. `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub thread_id: Option<String>,
    pub vector_store_id: Option<String>,
    pub values: Option<Vec<String>>,
}

impl UserUpdate {
    pub fn thread_id(thread_id: impl Into<String>) -> Self {
        UserUpdate {
            thread_id: Some(thread_id.into()),
            ..Default::default()
        }
    }

    pub fn vector_store_id(vector_store_id: impl Into<String>) -> Self {
        UserUpdate {
            vector_store_id: Some(vector_store_id.into()),
            ..Default::default()
        }
    }

    pub fn values(values: Vec<String>) -> Self {
        UserUpdate {
            values: Some(values),
            ..Default::default()
        }
    }

    fn apply(self, user: &mut UserRecord) {
        if let Some(thread_id) = self.thread_id {
            user.thread_id = Some(thread_id);
        }
        if let Some(vector_store_id) = self.vector_store_id {
            user.vector_store_id = Some(vector_store_id);
        }
        if let Some(values) = self.values {
            user.values = values;
        }
    }
}

/// Storage for user records. Updates are last-write-wins.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, telegram_id: i64) -> Result<Option<UserRecord>>;
    async fn create_user(&self, telegram_id: i64) -> Result<UserRecord>;
    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<UserRecord>;

    async fn get_or_create_user(&self, telegram_id: i64) -> Result<UserRecord> {
        match self.get_user(telegram_id).await? {
            Some(user) => Ok(user),
            None => self.create_user(telegram_id).await,
        }
    }
}

/// Postgres-backed store. The schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = r#"id, telegram_id, thread_id, vector_store_id, "values""#;

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_user(&self, telegram_id: i64) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE telegram_id = $1"
        ))
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, telegram_id: i64) -> Result<UserRecord> {
        // Concurrent first messages from one user both land here; the second
        // insert turns into a read of the winner's row.
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (telegram_id) VALUES ($1) \
             ON CONFLICT (telegram_id) DO UPDATE SET telegram_id = EXCLUDED.telegram_id \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(telegram_id)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(user_id = user.id, telegram_id, "created user");
        Ok(user)
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<UserRecord> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET \
             thread_id = COALESCE($2, thread_id), \
             vector_store_id = COALESCE($3, vector_store_id), \
             \"values\" = COALESCE($4, \"values\") \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.thread_id)
        .bind(update.vector_store_id)
        .bind(update.values)
        .fetch_optional(&self.pool)
        .await?;
        user.ok_or(RelayError::UserNotFound(id))
    }
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<i64, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the row with primary key `id`.
    pub async fn user(&self, id: i64) -> Option<UserRecord> {
        let users = self.users.lock().await;
        users.values().find(|user| user.id == id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, telegram_id: i64) -> Result<Option<UserRecord>> {
        Ok(self.users.lock().await.get(&telegram_id).cloned())
    }

    async fn create_user(&self, telegram_id: i64) -> Result<UserRecord> {
        let mut users = self.users.lock().await;
        let next_id = users.len() as i64 + 1;
        let user = users.entry(telegram_id).or_insert_with(|| UserRecord {
            id: next_id,
            telegram_id,
            thread_id: None,
            vector_store_id: None,
            values: Vec::new(),
        });
        Ok(user.clone())
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<UserRecord> {
        let mut users = self.users.lock().await;
        let user = users
            .values_mut()
            .find(|user| user.id == id)
            .ok_or(RelayError::UserNotFound(id))?;
        update.apply(user);
        Ok(user.clone())
    }
}
