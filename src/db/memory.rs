use async_trait::async_trait;
use tokio::sync::Mutex;

use super::queue_store::{LegacyStore, QueueStore, StoreError};
use crate::models::QueueItem;

/// Process-local store for tests and embedders that bring their own persistence.
#[derive(Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<QueueItem>>,
    legacy: Mutex<Option<String>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<QueueItem>) -> Self {
        Self {
            items: Mutex::new(items),
            legacy: Mutex::new(None),
        }
    }

    pub async fn set_legacy(&self, raw: impl Into<String>) {
        *self.legacy.lock().await = Some(raw.into());
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn read(&self) -> Result<Vec<QueueItem>, StoreError> {
        Ok(self.items.lock().await.clone())
    }

    async fn write_all(&self, items: &[QueueItem]) -> Result<(), StoreError> {
        *self.items.lock().await = items.to_vec();
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.items.lock().await.clear();
        Ok(())
    }

    async fn append(&self, items: Vec<QueueItem>) -> Result<usize, StoreError> {
        let mut current = self.items.lock().await;
        current.extend(items);
        Ok(current.len())
    }
}

#[async_trait]
impl LegacyStore for MemoryQueueStore {
    async fn read_legacy(&self) -> Result<Option<String>, StoreError> {
        Ok(self.legacy.lock().await.clone())
    }

    async fn delete_legacy(&self) -> Result<(), StoreError> {
        *self.legacy.lock().await = None;
        Ok(())
    }
}
