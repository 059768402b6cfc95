#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{patch, post};
use axum::{Json, Router};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::{Semaphore, watch};
use uuid::Uuid;

use field_outbox::config::{Config, DEFAULT_STOP_STATUS_PATH, DEFAULT_SUBMIT_PATH};
use field_outbox::db::{self, QueueStore, SqliteQueueStore};
use field_outbox::handlers::{HandlerError, HandlerRegistry, ItemHandler};
use field_outbox::models::{ItemBody, ItemKind, QueueItem, SubmissionPayload};
use field_outbox::outbox::Outbox;
use field_outbox::state::SharedState;
use field_outbox::status::StatusSignal;
use field_outbox::sync::{RetryPolicy, SyncCoordinator, SyncSettings};

// ── Fixtures ────────────────────────────────────────────────────

pub fn submission(form_id: i64, stop_id: Option<i64>) -> ItemBody {
    ItemBody::Submission(SubmissionPayload {
        form_id,
        data: json!({ "x": form_id }),
        stop_id,
        location: None,
    })
}

pub fn form_id(item: &QueueItem) -> i64 {
    match &item.body {
        ItemBody::Submission(p) => p.form_id,
    }
}

/// Settings with no backoff, so every failed item is due again immediately.
pub fn eager_settings(concurrency: usize) -> SyncSettings {
    SyncSettings {
        concurrency,
        handler_timeout: Duration::from_secs(5),
        retry: RetryPolicy::unbounded(),
    }
}

pub fn test_config(api_base_url: &str) -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        api_base_url: api_base_url.to_string(),
        api_token: Some("test-token".to_string()),
        submit_path: DEFAULT_SUBMIT_PATH.to_string(),
        stop_status_path: DEFAULT_STOP_STATUS_PATH.to_string(),
        concurrency: 3,
        max_attempts: 0,
        backoff_base: Duration::ZERO,
        backoff_max: Duration::ZERO,
        handler_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
        // Long enough that only connectivity transitions trigger the worker.
        retry_interval: Duration::from_secs(3600),
        start_online: false,
        probe_url: None,
        probe_interval: Duration::from_secs(15),
        max_body_size: 1_048_576,
        log_level: "warn".to_string(),
    }
}

/// Poll `check` until it holds, for up to ~5s.
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ── Scripted handler ────────────────────────────────────────────

/// In-process handler double: fails, panics or blocks per form id and
/// tracks how many calls overlap.
#[derive(Default)]
pub struct ScriptedHandler {
    failures: Mutex<HashMap<i64, u32>>,
    panics: Mutex<HashSet<i64>>,
    delay: Duration,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<(Uuid, i64)>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Every call waits for a permit from `release` before finishing.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn fail(&self, form_id: i64, times: u32) {
        self.failures.lock().unwrap().insert(form_id, times);
    }

    pub fn panic_on(&self, form_id: i64) {
        self.panics.lock().unwrap().insert(form_id);
    }

    pub fn calls(&self) -> Vec<(Uuid, i64)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, form_id: i64) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&form_id) {
            Some(n) if *n > 0 => {
                if *n != u32::MAX {
                    *n -= 1;
                }
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ItemHandler for ScriptedHandler {
    fn kind(&self) -> ItemKind {
        ItemKind::Submission
    }

    async fn handle(&self, item: &mut QueueItem) -> Result<(), HandlerError> {
        let form = form_id(item);
        self.calls.lock().unwrap().push((item.id, form));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.lock().unwrap().contains(&form) {
            panic!("scripted panic for form {form}");
        }
        if self.should_fail(form) {
            return Err(HandlerError::from(format!("scripted failure for form {form}")));
        }
        Ok(())
    }
}

pub struct Harness {
    pub outbox: Arc<Outbox>,
    pub coordinator: Arc<SyncCoordinator>,
    pub store: Arc<dyn QueueStore>,
    pub status: StatusSignal,
}

pub fn harness(
    store: Arc<dyn QueueStore>,
    handler: Arc<dyn ItemHandler>,
    settings: SyncSettings,
) -> Harness {
    let status = StatusSignal::new();
    let outbox = Arc::new(Outbox::new(store.clone(), status.clone()));
    let mut handlers = HandlerRegistry::new();
    handlers.register(handler);
    let coordinator = Arc::new(SyncCoordinator::new(
        outbox.clone(),
        Arc::new(handlers),
        status.clone(),
        settings,
    ));
    Harness {
        outbox,
        coordinator,
        store,
        status,
    }
}

// ── Mock upstream API ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub body: Value,
    pub idempotency_key: Option<String>,
    pub authorization: Option<String>,
    pub accepted: bool,
}

#[derive(Default)]
pub struct UpstreamState {
    calls: Mutex<Vec<RecordedCall>>,
    form_failures: Mutex<HashMap<i64, u32>>,
    stop_failures: Mutex<HashMap<i64, u32>>,
}

/// Stand-in for the remote forms API, recording every request it receives.
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: Arc<UpstreamState>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn fail_form(&self, form_id: i64, times: u32) {
        self.state.form_failures.lock().unwrap().insert(form_id, times);
    }

    pub fn fail_form_always(&self, form_id: i64) {
        self.fail_form(form_id, u32::MAX);
    }

    pub fn heal_form(&self, form_id: i64) {
        self.state.form_failures.lock().unwrap().remove(&form_id);
    }

    pub fn fail_stop(&self, stop_id: i64, times: u32) {
        self.state.stop_failures.lock().unwrap().insert(stop_id, times);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path.starts_with("/api/forms/"))
            .collect()
    }

    pub fn accepted_submissions(&self) -> Vec<RecordedCall> {
        self.submissions().into_iter().filter(|c| c.accepted).collect()
    }

    pub fn stop_updates(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path.starts_with("/api/stops/"))
            .collect()
    }
}

fn take_failure(failures: &Mutex<HashMap<i64, u32>>, key: i64) -> bool {
    let mut failures = failures.lock().unwrap();
    match failures.get_mut(&key) {
        Some(n) if *n > 0 => {
            if *n != u32::MAX {
                *n -= 1;
            }
            true
        }
        _ => false,
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

async fn receive_submission(
    State(up): State<Arc<UpstreamState>>,
    Path(form_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let accepted = !take_failure(&up.form_failures, form_id);
    up.calls.lock().unwrap().push(RecordedCall {
        path: format!("/api/forms/{form_id}/submissions"),
        body,
        idempotency_key: header(&headers, "idempotency-key"),
        authorization: header(&headers, "authorization"),
        accepted,
    });

    if accepted {
        (StatusCode::CREATED, Json(json!({ "status": "created" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "temporarily unavailable" })),
        )
    }
}

async fn receive_stop_status(
    State(up): State<Arc<UpstreamState>>,
    Path(stop_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let accepted = !take_failure(&up.stop_failures, stop_id);
    up.calls.lock().unwrap().push(RecordedCall {
        path: format!("/api/stops/{stop_id}/status"),
        body,
        idempotency_key: header(&headers, "idempotency-key"),
        authorization: header(&headers, "authorization"),
        accepted,
    });

    if accepted {
        (StatusCode::OK, Json(json!({ "status": "updated" })))
    } else {
        (StatusCode::BAD_GATEWAY, Json(json!({ "error": "upstream down" })))
    }
}

pub async fn spawn_upstream() -> MockUpstream {
    let state = Arc::new(UpstreamState::default());

    let router = Router::new()
        .route("/api/forms/{form_id}/submissions", post(receive_submission))
        .route("/api/stops/{stop_id}/status", patch(receive_stop_status))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind upstream");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Upstream failed");
    });

    MockUpstream { addr, state }
}

// ── Running app ─────────────────────────────────────────────────

/// A running outbox daemon backed by in-memory SQLite.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: SharedState,
    pub store: Arc<SqliteQueueStore>,
    shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn put(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("put request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn delete(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("delete request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn enqueue(&self, form_id: i64, stop_id: Option<i64>) -> (Value, StatusCode) {
        let mut payload = json!({ "formId": form_id, "data": { "x": form_id } });
        if let Some(stop_id) = stop_id {
            payload["stopId"] = json!(stop_id);
        }
        self.post(
            "/api/v1/outbox",
            &json!({ "kind": "submission", "payload": payload }),
        )
        .await
    }

    pub async fn queue_length(&self) -> usize {
        self.store.read().await.expect("store read failed").len()
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

pub async fn spawn_app(config: Config) -> TestApp {
    let pool = db::connect_in_memory()
        .await
        .expect("Failed to open in-memory database");
    db::migrate(&pool).await.expect("Failed to run migrations");

    let store = Arc::new(SqliteQueueStore::new(pool));
    let state = field_outbox::build_state(store.clone(), config).expect("Failed to build state");

    let (shutdown, shutdown_rx) = watch::channel(false);
    field_outbox::worker::spawn(state.clone(), shutdown_rx);

    let app = field_outbox::build_app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        client: Client::new(),
        state,
        store,
        shutdown,
    }
}
