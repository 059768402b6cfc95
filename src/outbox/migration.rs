use chrono::Utc;
use serde::Serialize;

use super::Outbox;
use crate::db::{LegacyStore, StoreError};
use crate::models::{LegacyEntry, QueueItem};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Legacy data was present.
    pub found: bool,
    pub migrated: usize,
    /// Entries whose id was already queued.
    pub skipped: usize,
    /// Individual entries that could not be read and were dropped.
    pub rejected: usize,
    /// The legacy value as a whole was unreadable and dropped.
    pub discarded: bool,
}

/// Fold the old store's flat list into the outbox, once.
///
/// Entries are merged into the current list, never replacing it. A bad entry
/// is dropped on its own; its siblings are still migrated. The legacy location
/// is deleted whether or not it parsed, so a corrupt value is not retried on
/// every start. Store errors propagate and leave the legacy data in place.
pub async fn migrate_legacy(
    outbox: &Outbox,
    legacy: &dyn LegacyStore,
) -> Result<MigrationReport, StoreError> {
    let mut report = MigrationReport::default();

    let raw = match legacy.read_legacy().await? {
        Some(raw) => raw,
        None => return Ok(report),
    };

    if raw.trim().is_empty() {
        legacy.delete_legacy().await?;
        return Ok(report);
    }

    report.found = true;

    match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
        Ok(entries) => {
            let now = Utc::now();
            let mut items: Vec<QueueItem> = Vec::with_capacity(entries.len());
            for (index, entry) in entries.into_iter().enumerate() {
                match serde_json::from_value::<LegacyEntry>(entry) {
                    Ok(entry) => items.push(entry.into_item(now)),
                    Err(e) => {
                        report.rejected += 1;
                        tracing::warn!("Dropping unreadable legacy outbox entry {index}: {e}");
                    }
                }
            }

            let (migrated, skipped) = outbox.merge(items).await?;
            report.migrated = migrated;
            report.skipped = skipped;
            tracing::info!(
                "Migrated {migrated} legacy outbox entries ({skipped} already queued, {} unreadable)",
                report.rejected
            );
        }
        Err(e) => {
            report.discarded = true;
            tracing::warn!("Discarding unreadable legacy outbox data: {e}");
        }
    }

    legacy.delete_legacy().await?;
    outbox.refresh_status().await?;

    Ok(report)
}
