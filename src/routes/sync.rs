use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::error::AppError;
use crate::status::OutboxStatus;
use crate::state::SharedState;
use crate::sync::{DrainMode, DrainReport};

#[derive(Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

/// Manual "sync now". Attempts every pending item regardless of backoff.
pub async fn sync_now(State(state): State<SharedState>) -> Result<Json<DrainReport>, AppError> {
    let report = state.coordinator.drain(DrainMode::Forced).await?;
    if report.skipped {
        return Err(AppError::Conflict("A sync is already running".to_string()));
    }
    Ok(Json(report))
}

pub async fn status(State(state): State<SharedState>) -> Json<OutboxStatus> {
    Json(state.status.current())
}

pub async fn set_connectivity(
    State(state): State<SharedState>,
    Json(req): Json<ConnectivityRequest>,
) -> Json<OutboxStatus> {
    state.connectivity.set_online(req.online);
    Json(state.status.current())
}

pub async fn cache(State(state): State<SharedState>) -> Json<BTreeMap<String, u64>> {
    Json(state.cache.snapshot())
}

pub async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.status.events();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event.name())
                        .json_data(&event)
                        .unwrap_or_else(|_| Event::default().event("error"));
                    return Some((Ok(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event stream lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
