pub mod policy;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::db::StoreError;
use crate::handlers::{HandlerError, HandlerRegistry};
use crate::models::{ItemState, QueueItem};
use crate::outbox::Outbox;
use crate::status::{OutboxEvent, StatusSignal};

pub use policy::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    /// Automatic trigger: only items whose backoff has elapsed.
    Scheduled,
    /// Operator "sync now": every pending item, ignoring backoff.
    Forced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Another drain was already running; nothing was done.
    pub skipped: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Items left in the outbox after write-back.
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// Items dispatched together in one batch.
    pub concurrency: usize,
    pub handler_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            handler_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            handler_timeout: config.handler_timeout,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: config.backoff_base,
                max_delay: config.backoff_max,
                jitter: true,
            },
        }
    }
}

/// Clears the single-flight flag however the drain exits.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
    status: &'a StatusSignal,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.status.set_syncing(false);
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SyncCoordinator {
    outbox: Arc<Outbox>,
    handlers: Arc<HandlerRegistry>,
    status: StatusSignal,
    settings: SyncSettings,
    draining: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(
        outbox: Arc<Outbox>,
        handlers: Arc<HandlerRegistry>,
        status: StatusSignal,
        settings: SyncSettings,
    ) -> Self {
        Self {
            outbox,
            handlers,
            status,
            settings: SyncSettings {
                concurrency: settings.concurrency.max(1),
                ..settings
            },
            draining: AtomicBool::new(false),
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Run one drain cycle.
    ///
    /// Due items are dispatched in batches of `concurrency`; a batch fully
    /// settles before the next one starts. Delivered items are removed, failed
    /// ones are rescheduled (or dead-lettered) and written back. Only store
    /// errors escape; handler failures are per item.
    pub async fn drain(&self, mode: DrainMode) -> Result<DrainReport, StoreError> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Drain already in progress, ignoring {mode:?} trigger");
            return Ok(DrainReport {
                skipped: true,
                ..Default::default()
            });
        }
        let _guard = DrainGuard {
            flag: &self.draining,
            status: &self.status,
        };

        let snapshot = self.outbox.snapshot().await?;
        if snapshot.is_empty() {
            return Ok(DrainReport::default());
        }

        let total = snapshot.len();
        let now = Utc::now();
        let due: Vec<QueueItem> = snapshot
            .into_iter()
            .filter(|item| match mode {
                DrainMode::Scheduled => item.is_due(now),
                DrainMode::Forced => item.state == ItemState::Pending,
            })
            .collect();

        if due.is_empty() {
            tracing::debug!("Nothing due in outbox ({total} waiting)");
            return Ok(DrainReport {
                remaining: total,
                ..Default::default()
            });
        }

        tracing::info!("Draining outbox: {} of {total} items due ({mode:?})", due.len());
        self.status.set_syncing(true);
        self.status.publish(OutboxEvent::SyncStarted { due: due.len() });

        let mut report = DrainReport {
            attempted: due.len(),
            ..Default::default()
        };
        let mut touched: HashMap<Uuid, Option<QueueItem>> = HashMap::with_capacity(due.len());

        for batch in due.chunks(self.settings.concurrency) {
            let outcomes = join_all(batch.iter().cloned().map(|item| self.dispatch(item))).await;

            for (mut item, outcome) in outcomes {
                match outcome {
                    Ok(()) => {
                        report.succeeded += 1;
                        touched.insert(item.id, None);
                    }
                    Err(e) => {
                        report.failed += 1;
                        self.settings.retry.record_failure(&mut item, &e.message, Utc::now());
                        if item.is_dead_letter() {
                            report.dead_lettered += 1;
                            tracing::warn!(
                                "{} item {} dead-lettered after {} attempts: {e}",
                                item.kind(),
                                item.id,
                                item.attempts
                            );
                        } else {
                            tracing::warn!(
                                "{} item {} failed (attempt {}): {e}",
                                item.kind(),
                                item.id,
                                item.attempts
                            );
                        }
                        touched.insert(item.id, Some(item));
                    }
                }
            }
        }

        let remaining = self.outbox.commit(touched).await?;
        report.remaining = remaining.len();

        self.status.mark_synced(Utc::now());
        self.status.publish(OutboxEvent::SyncFinished {
            succeeded: report.succeeded,
            failed: report.failed,
            dead_lettered: report.dead_lettered,
        });

        tracing::info!(
            "Drain finished: {} delivered, {} failed, {} remaining",
            report.succeeded,
            report.failed,
            report.remaining
        );

        Ok(report)
    }

    /// Run one item's handler. Errors, timeouts and panics all come back as
    /// that item's failure and never touch its siblings.
    async fn dispatch(&self, mut item: QueueItem) -> (QueueItem, Result<(), HandlerError>) {
        let Some(handler) = self.handlers.get(item.kind()).cloned() else {
            let err = HandlerError::from(format!("No handler registered for {}", item.kind()));
            return (item, Err(err));
        };

        let timeout = self.settings.handler_timeout;
        let outcome = AssertUnwindSafe(tokio::time::timeout(timeout, handler.handle(&mut item)))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HandlerError::from(format!(
                "Handler timed out after {}s",
                timeout.as_secs()
            ))),
            Err(_) => Err(HandlerError::from("Handler panicked")),
        };

        (item, result)
    }
}
