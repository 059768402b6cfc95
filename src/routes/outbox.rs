use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ItemBody, QueueItem};
use crate::state::SharedState;
use crate::worker;

/// Capture an item. Succeeds as soon as it is durable, online or not.
pub async fn enqueue(
    State(state): State<SharedState>,
    Json(body): Json<ItemBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    body.validate().map_err(AppError::BadRequest)?;

    let item = state.outbox.enqueue(body).await?;
    let queue_length = state.status.current().queue_length;

    if state.connectivity.is_online() {
        let state = state.clone();
        tokio::spawn(async move { worker::drain(&state).await });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "id": item.id,
            "status": "queued",
            "message": "Saved, will upload when online",
            "queueLength": queue_length,
        })),
    ))
}

pub async fn list(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, AppError> {
    let items = state.outbox.list().await?;
    Ok(Json(json!({
        "items": items,
        "total": items.len(),
    })))
}

pub async fn abandon(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .outbox
        .abandon(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Queue item not found".to_string()))?;
    Ok(Json(json!({ "status": "abandoned" })))
}

pub async fn retry(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    let item = state
        .outbox
        .revive(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Queue item not found".to_string()))?;
    Ok(Json(item))
}
