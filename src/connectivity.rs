use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::status::{OutboxEvent, StatusSignal};

/// Online/offline state. Only real transitions notify subscribers.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
    status: StatusSignal,
}

impl ConnectivityMonitor {
    pub fn new(initial: bool, status: StatusSignal) -> Self {
        let (state, _) = watch::channel(initial);
        status.set_online(initial);
        Self {
            state: Arc::new(state),
            status,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Record the runtime's signal. Returns true if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            self.status.set_online(online);
            if online {
                tracing::info!("Connectivity restored");
                self.status.publish(OutboxEvent::Online);
            } else {
                tracing::info!("Connectivity lost");
                self.status.publish(OutboxEvent::Offline);
            }
        }

        changed
    }
}

/// Poll `url` and feed the result into the monitor. Any HTTP response counts
/// as online; only a transport failure means offline.
pub fn spawn_probe(
    monitor: ConnectivityMonitor,
    client: reqwest::Client,
    url: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("Connectivity probe started ({url} every {}s)", interval.as_secs());

        loop {
            if *shutdown.borrow() {
                break;
            }

            let reachable = match client.get(&url).send().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!("Connectivity probe failed: {e}");
                    false
                }
            };
            monitor.set_online(reachable);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Connectivity probe stopped");
    })
}
