pub mod outbox;
pub mod sync;

use axum::Router;
use axum::routing::{delete, get, post, put};

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Outbox
        .route("/api/v1/outbox", get(outbox::list).post(outbox::enqueue))
        .route("/api/v1/outbox/{id}", delete(outbox::abandon))
        .route("/api/v1/outbox/{id}/retry", post(outbox::retry))
        // Sync & status
        .route("/api/v1/sync", post(sync::sync_now))
        .route("/api/v1/status", get(sync::status))
        .route("/api/v1/connectivity", put(sync::set_connectivity))
        .route("/api/v1/events", get(sync::events))
        .route("/api/v1/cache", get(sync::cache))
}
