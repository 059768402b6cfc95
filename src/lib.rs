pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod outbox;
pub mod routes;
pub mod state;
pub mod status;
pub mod sync;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::cache::QueryCache;
use crate::config::Config;
use crate::db::QueueStore;
use crate::handlers::HandlerRegistry;
use crate::handlers::submission::SubmissionHandler;
use crate::state::{AppState, SharedState};
use crate::status::StatusSignal;

/// Build the application state with the production handler set.
pub fn build_state(store: Arc<dyn QueueStore>, config: Config) -> Result<SharedState, reqwest::Error> {
    let status = StatusSignal::new();
    let cache = Arc::new(QueryCache::new(status.clone()));

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(SubmissionHandler::new(&config, cache.clone())?));

    Ok(AppState::with_handlers(store, config, handlers, status, cache))
}

pub fn build_app(state: SharedState) -> Router {
    let max_body_size = state.config.max_body_size;

    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body_size))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
