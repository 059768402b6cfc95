use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::template;
use super::{HandlerError, ItemHandler};
use crate::cache::{self, CacheInvalidator};
use crate::config::Config;
use crate::models::{DeliveryStage, ItemBody, ItemKind, Location, QueueItem, SubmissionPayload};

pub const COMPLETED_STATUS: &str = "completed";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryRequest<'a> {
    data: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a Location>,
    submitted_at: DateTime<Utc>,
}

/// Delivers captured form submissions, then marks the stop they were
/// captured at as completed.
pub struct SubmissionHandler {
    client: reqwest::Client,
    api_base: String,
    api_token: Option<String>,
    submit_path: String,
    stop_status_path: String,
    cache: Arc<dyn CacheInvalidator>,
}

impl SubmissionHandler {
    pub fn new(config: &Config, cache: Arc<dyn CacheInvalidator>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            submit_path: config.submit_path.clone(),
            stop_status_path: config.stop_status_path.clone(),
            cache,
        })
    }

    fn url(&self, path_template: &str, item: &QueueItem) -> String {
        format!("{}{}", self.api_base, template::render(path_template, item))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn deliver(&self, item: &QueueItem, payload: &SubmissionPayload) -> Result<(), HandlerError> {
        // The capture time, not the replay time, is the submission time.
        let body = DeliveryRequest {
            data: &payload.data,
            stop_id: payload.stop_id,
            location: payload.location.as_ref(),
            submitted_at: item.created_at,
        };

        let resp = self
            .authorize(self.client.post(self.url(&self.submit_path, item)))
            .header("Idempotency-Key", item.id.to_string())
            .json(&body)
            .send()
            .await?;

        check_status("Submission", resp).await
    }

    async fn complete_stop(
        &self,
        item: &QueueItem,
        location: Option<&Location>,
    ) -> Result<(), HandlerError> {
        let mut body = json!({ "status": COMPLETED_STATUS });
        if let Some(loc) = location {
            body["location"] = json!(loc);
        }

        let resp = self
            .authorize(self.client.patch(self.url(&self.stop_status_path, item)))
            .json(&body)
            .send()
            .await?;

        check_status("Stop status", resp).await
    }
}

async fn check_status(what: &str, resp: reqwest::Response) -> Result<(), HandlerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }

    let body = resp
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(512)
        .collect::<String>();
    Err(HandlerError::from(format!("{what} endpoint returned {status}: {body}")))
}

#[async_trait]
impl ItemHandler for SubmissionHandler {
    fn kind(&self) -> ItemKind {
        ItemKind::Submission
    }

    async fn handle(&self, item: &mut QueueItem) -> Result<(), HandlerError> {
        let payload = match &item.body {
            ItemBody::Submission(payload) => payload.clone(),
        };

        if item.stage == DeliveryStage::Queued {
            self.deliver(item, &payload).await?;
            item.stage = DeliveryStage::Delivered;
            tracing::debug!("Delivered submission {} for form {}", item.id, payload.form_id);
        }

        if let Some(stop_id) = payload.stop_id {
            self.complete_stop(item, payload.location.as_ref()).await?;
            self.cache.invalidate(&cache::stop_key(stop_id));
            self.cache.invalidate(cache::ROUTE_VIEW_KEY);
            tracing::debug!("Marked stop {stop_id} completed");
        }

        Ok(())
    }
}
