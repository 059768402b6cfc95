use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::models::{ItemKind, QueueItem};

const EVENT_CAPACITY: usize = 256;

/// Snapshot the presentation layer renders (badge count, sync spinner, offline banner).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxStatus {
    pub queue_length: usize,
    pub pending: usize,
    pub dead_letters: usize,
    pub is_online: bool,
    pub syncing: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Ephemeral notifications, rendered as toasts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxEvent {
    Enqueued {
        id: Uuid,
        kind: ItemKind,
    },
    SyncStarted {
        due: usize,
    },
    #[serde(rename_all = "camelCase")]
    SyncFinished {
        succeeded: usize,
        failed: usize,
        dead_lettered: usize,
    },
    Online,
    Offline,
    CacheInvalidated {
        key: String,
        generation: u64,
    },
}

impl OutboxEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboxEvent::Enqueued { .. } => "enqueued",
            OutboxEvent::SyncStarted { .. } => "sync_started",
            OutboxEvent::SyncFinished { .. } => "sync_finished",
            OutboxEvent::Online => "online",
            OutboxEvent::Offline => "offline",
            OutboxEvent::CacheInvalidated { .. } => "cache_invalidated",
        }
    }
}

/// Process-wide status: a latest-value snapshot plus a fan-out of events.
#[derive(Clone)]
pub struct StatusSignal {
    status: Arc<watch::Sender<OutboxStatus>>,
    events: broadcast::Sender<OutboxEvent>,
}

impl StatusSignal {
    pub fn new() -> Self {
        let (status, _) = watch::channel(OutboxStatus::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            status: Arc::new(status),
            events,
        }
    }

    pub fn current(&self) -> OutboxStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OutboxStatus> {
        self.status.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<OutboxEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: OutboxEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    pub fn set_queue(&self, items: &[QueueItem]) {
        let dead_letters = items.iter().filter(|i| i.is_dead_letter()).count();
        self.status.send_modify(|s| {
            s.queue_length = items.len();
            s.dead_letters = dead_letters;
            s.pending = items.len() - dead_letters;
        });
    }

    pub fn set_online(&self, online: bool) {
        self.status.send_modify(|s| s.is_online = online);
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.status.send_modify(|s| s.syncing = syncing);
    }

    pub fn mark_synced(&self, at: DateTime<Utc>) {
        self.status.send_modify(|s| s.last_sync_at = Some(at));
    }
}

impl Default for StatusSignal {
    fn default() -> Self {
        Self::new()
    }
}
