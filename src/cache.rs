use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::status::{OutboxEvent, StatusSignal};

/// Aggregate view listing the worker's stops for the day.
pub const ROUTE_VIEW_KEY: &str = "route:today";

pub fn stop_key(stop_id: i64) -> String {
    format!("stop:{stop_id}")
}

/// Invalidate-by-key access to the reactive view cache.
pub trait CacheInvalidator: Send + Sync {
    /// Mark `key` stale. Returns the key's new generation.
    fn invalidate(&self, key: &str) -> u64;
}

/// Generation counters per cache key. Views compare the generation they were
/// rendered at with the current one to know when to refetch.
pub struct QueryCache {
    generations: DashMap<String, u64>,
    status: StatusSignal,
}

impl QueryCache {
    pub fn new(status: StatusSignal) -> Self {
        Self {
            generations: DashMap::new(),
            status,
        }
    }

    pub fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).map(|g| *g).unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.generations
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

impl CacheInvalidator for QueryCache {
    fn invalidate(&self, key: &str) -> u64 {
        let generation = {
            let mut entry = self.generations.entry(key.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        tracing::debug!("Invalidated cache key {key} (generation {generation})");
        self.status.publish(OutboxEvent::CacheInvalidated {
            key: key.to_string(),
            generation,
        });
        generation
    }
}
