use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::SharedState;
use crate::sync::DrainMode;

/// Start the sync worker. It drains the outbox whenever connectivity comes
/// back and on every retry tick while online, until shutdown is signaled.
pub fn spawn(state: SharedState, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(run(state, shutdown))
}

async fn run(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut online = state.connectivity.subscribe();
    let interval = state.config.retry_interval;

    tracing::info!("Sync worker started (retry tick every {}s)", interval.as_secs());

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                if *online.borrow_and_update() {
                    drain(&state).await;
                }
            }
            _ = tokio::time::sleep(interval) => {
                if state.connectivity.is_online() {
                    drain(&state).await;
                }
            }
            res = shutdown.changed() => {
                if res.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("Sync worker stopped");
}

/// Run a scheduled drain. Going offline meanwhile does not cancel it.
pub async fn drain(state: &SharedState) {
    match state.coordinator.drain(DrainMode::Scheduled).await {
        Ok(report) if report.skipped => {}
        Ok(report) => {
            if report.failed > 0 {
                tracing::warn!("{} items failed to sync", report.failed);
            }
        }
        Err(e) => tracing::error!("Outbox drain failed: {e}"),
    }
}
