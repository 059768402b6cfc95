use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::kv;
use crate::models::QueueItem;

/// Well-known key holding the pending list.
pub const QUEUE_KEY: &str = "outbox.pending";

/// Key the previous offline store wrote its flat list under.
pub const LEGACY_KEY: &str = "offline_submissions";

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    Serialization(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(err) => write!(f, "Queue store database error: {err}"),
            StoreError::Serialization(err) => write!(f, "Queue store serialization error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(err) => Some(err),
            StoreError::Serialization(err) => Some(err),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

/// Durable home of the pending list. There is no per-item update: callers
/// read the whole list, change it, and write it back.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Current list in arrival order, empty if nothing was ever written.
    async fn read(&self) -> Result<Vec<QueueItem>, StoreError>;

    /// Replace the whole list.
    async fn write_all(&self, items: &[QueueItem]) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Append to the end of the list in one step. Returns the new length.
    async fn append(&self, items: Vec<QueueItem>) -> Result<usize, StoreError>;
}

/// Raw access to the location the old offline store used.
#[async_trait]
pub trait LegacyStore: Send + Sync {
    async fn read_legacy(&self) -> Result<Option<String>, StoreError>;
    async fn delete_legacy(&self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode(raw: Option<String>) -> Result<Vec<QueueItem>, StoreError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
        _ => Ok(Vec::new()),
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn read(&self) -> Result<Vec<QueueItem>, StoreError> {
        decode(kv::get(&self.pool, QUEUE_KEY).await?)
    }

    async fn write_all(&self, items: &[QueueItem]) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(items)?;
        kv::put(&self.pool, QUEUE_KEY, &encoded).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        kv::delete(&self.pool, QUEUE_KEY).await?;
        Ok(())
    }

    async fn append(&self, items: Vec<QueueItem>) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut current = decode(kv::get(&mut *tx, QUEUE_KEY).await?)?;
        current.extend(items);
        let encoded = serde_json::to_string(&current)?;
        kv::put(&mut *tx, QUEUE_KEY, &encoded).await?;
        tx.commit().await?;
        Ok(current.len())
    }
}

#[async_trait]
impl LegacyStore for SqliteQueueStore {
    async fn read_legacy(&self) -> Result<Option<String>, StoreError> {
        Ok(kv::get(&self.pool, LEGACY_KEY).await?)
    }

    async fn delete_legacy(&self) -> Result<(), StoreError> {
        kv::delete(&self.pool, LEGACY_KEY).await?;
        Ok(())
    }
}
