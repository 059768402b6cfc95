pub mod migration;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{QueueStore, StoreError};
use crate::models::{ItemBody, QueueItem};
use crate::status::{OutboxEvent, StatusSignal};

/// Owner of the durable pending list.
///
/// Every read-modify-write of the list goes through `write_lock`, so producers,
/// operator actions and drain write-backs never interleave. The lock is never
/// held across a network call.
pub struct Outbox {
    store: Arc<dyn QueueStore>,
    write_lock: Mutex<()>,
    status: StatusSignal,
}

impl Outbox {
    pub fn new(store: Arc<dyn QueueStore>, status: StatusSignal) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            status,
        }
    }

    /// Durably record a new item. Returns once the write has landed; only a
    /// failed write is an error.
    pub async fn enqueue(&self, body: ItemBody) -> Result<QueueItem, StoreError> {
        let item = QueueItem::new(body);

        let length = {
            let _guard = self.write_lock.lock().await;
            self.store.append(vec![item.clone()]).await?
        };

        tracing::info!("Queued {} item {} ({length} in outbox)", item.kind(), item.id);
        self.status.publish(OutboxEvent::Enqueued {
            id: item.id,
            kind: item.kind(),
        });
        // The item is queued at this point, so a failed status read must not
        // make the producer resubmit it.
        if let Err(e) = self.refresh_status().await {
            tracing::warn!("Queued item {} but could not refresh status: {e}", item.id);
        }

        Ok(item)
    }

    pub async fn list(&self) -> Result<Vec<QueueItem>, StoreError> {
        self.store.read().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<QueueItem>, StoreError> {
        Ok(self.store.read().await?.into_iter().find(|item| item.id == id))
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.store.read().await?.len())
    }

    /// Operator gives up on an item. Returns the removed item, if it existed.
    pub async fn abandon(&self, id: Uuid) -> Result<Option<QueueItem>, StoreError> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            let mut items = self.store.read().await?;
            let Some(pos) = items.iter().position(|item| item.id == id) else {
                return Ok(None);
            };
            let removed = items.remove(pos);
            self.store.write_all(&items).await?;
            self.status.set_queue(&items);
            removed
        };

        tracing::warn!("Abandoned {} item {} after {} attempts", removed.kind(), id, removed.attempts);
        Ok(Some(removed))
    }

    /// Put an item (typically a dead letter) back on the retry schedule.
    pub async fn revive(&self, id: Uuid) -> Result<Option<QueueItem>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.store.read().await?;
        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        item.reset_schedule();
        let revived = item.clone();
        self.store.write_all(&items).await?;
        self.status.set_queue(&items);

        tracing::info!("Revived {} item {id}", revived.kind());
        Ok(Some(revived))
    }

    pub async fn refresh_status(&self) -> Result<(), StoreError> {
        let items = self.store.read().await?;
        self.status.set_queue(&items);
        Ok(())
    }

    pub(crate) async fn snapshot(&self) -> Result<Vec<QueueItem>, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.read().await
    }

    /// Write back the outcome of a drain cycle.
    ///
    /// `touched` maps every dispatched id to its replacement (`None` when the
    /// item was delivered). The list is re-read under the lock so anything
    /// enqueued, abandoned or revived while the drain was in flight is kept as
    /// it is now.
    pub(crate) async fn commit(
        &self,
        mut touched: HashMap<Uuid, Option<QueueItem>>,
    ) -> Result<Vec<QueueItem>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.store.read().await?;

        if touched.is_empty() {
            return Ok(current);
        }

        let merged: Vec<QueueItem> = current
            .into_iter()
            .filter_map(|item| match touched.remove(&item.id) {
                Some(replacement) => replacement,
                None => Some(item),
            })
            .collect();

        self.store.write_all(&merged).await?;
        self.status.set_queue(&merged);
        Ok(merged)
    }

    /// Append items recovered from legacy storage, skipping ids already present.
    /// Returns `(appended, skipped)`.
    pub(crate) async fn merge(&self, items: Vec<QueueItem>) -> Result<(usize, usize), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut seen: HashSet<Uuid> = self.store.read().await?.iter().map(|item| item.id).collect();

        let total = items.len();
        let fresh: Vec<QueueItem> = items.into_iter().filter(|item| seen.insert(item.id)).collect();
        let appended = fresh.len();

        if appended > 0 {
            self.store.append(fresh).await?;
        }

        Ok((appended, total - appended))
    }
}
