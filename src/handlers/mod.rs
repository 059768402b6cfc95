pub mod submission;
pub mod template;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{ItemKind, QueueItem};

#[derive(Debug)]
pub struct HandlerError {
    pub message: String,
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        HandlerError { message: s }
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        HandlerError {
            message: s.to_string(),
        }
    }
}

impl From<reqwest::Error> for HandlerError {
    fn from(err: reqwest::Error) -> Self {
        HandlerError {
            message: format!("Request failed: {err}"),
        }
    }
}

/// Replays one kind of queued item against the network.
///
/// The handler receives the item mutably so it can advance `stage` as steps
/// succeed; that progress is kept even when a later step fails.
#[async_trait]
pub trait ItemHandler: Send + Sync {
    fn kind(&self) -> ItemKind;
    async fn handle(&self, item: &mut QueueItem) -> Result<(), HandlerError>;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ItemKind, Arc<dyn ItemHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ItemHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: ItemKind) -> Option<&Arc<dyn ItemHandler>> {
        self.handlers.get(&kind)
    }
}
