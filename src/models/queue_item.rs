use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::submission::SubmissionPayload;

/// Discriminator for the kinds of work the outbox can defer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Submission,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Submission => "submission",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-tagged payload. Serialized as `{"kind": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ItemBody {
    Submission(SubmissionPayload),
}

impl ItemBody {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemBody::Submission(_) => ItemKind::Submission,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ItemBody::Submission(payload) => payload.validate(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Pending,
    DeadLetter,
}

/// How far a multi-step item got. A `Delivered` item only has its cascade left to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    #[default]
    Queued,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub body: ItemBody,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub state: ItemState,
    #[serde(default)]
    pub stage: DeliveryStage,
}

impl QueueItem {
    pub fn new(body: ItemBody) -> Self {
        Self::with_id(Uuid::now_v7(), body, Utc::now())
    }

    pub fn with_id(id: Uuid, body: ItemBody, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            body,
            created_at,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
            state: ItemState::Pending,
            stage: DeliveryStage::Queued,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.body.kind()
    }

    pub fn is_dead_letter(&self) -> bool {
        self.state == ItemState::DeadLetter
    }

    /// Whether a scheduled drain at `now` should attempt this item.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == ItemState::Pending && self.next_attempt_at.is_none_or(|at| at <= now)
    }

    /// Clear retry bookkeeping so the item is attempted on the next drain.
    pub fn reset_schedule(&mut self) {
        self.attempts = 0;
        self.next_attempt_at = None;
        self.last_error = None;
        self.state = ItemState::Pending;
    }
}
