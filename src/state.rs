use std::sync::Arc;

use crate::cache::QueryCache;
use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::db::QueueStore;
use crate::handlers::HandlerRegistry;
use crate::outbox::Outbox;
use crate::status::StatusSignal;
use crate::sync::{SyncCoordinator, SyncSettings};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub outbox: Arc<Outbox>,
    pub coordinator: Arc<SyncCoordinator>,
    pub connectivity: ConnectivityMonitor,
    pub status: StatusSignal,
    pub cache: Arc<QueryCache>,
}

impl AppState {
    /// Wire the outbox around `store` with an explicit handler set.
    pub fn with_handlers(
        store: Arc<dyn QueueStore>,
        config: Config,
        handlers: HandlerRegistry,
        status: StatusSignal,
        cache: Arc<QueryCache>,
    ) -> SharedState {
        let outbox = Arc::new(Outbox::new(store, status.clone()));
        let coordinator = Arc::new(SyncCoordinator::new(
            outbox.clone(),
            Arc::new(handlers),
            status.clone(),
            SyncSettings::from_config(&config),
        ));
        let connectivity = ConnectivityMonitor::new(config.start_online, status.clone());

        Arc::new(AppState {
            config,
            outbox,
            coordinator,
            connectivity,
            status,
            cache,
        })
    }
}
