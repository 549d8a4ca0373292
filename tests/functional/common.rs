//! Shared fixtures for functional tests

use api_gateway::{
    api::routes::create_router,
    backend::traits::{BackendClient, Endpoint, ForwardRequest, ForwardResponse},
    config::{BackendConfig, ClientIdentitySource, Settings},
    gateway::rate_limiter::ManualClock,
    AppError, AppState, Result,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;

/// In-memory stand-in for the backend pool.
///
/// Every endpoint answers unless its id is in `down`, in which case both
/// probes and forwards fail.
#[derive(Default)]
pub struct FakeBackend {
    pub down: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
    pub probes: Mutex<usize>,
}

impl FakeBackend {
    pub fn take_down(&self, id: &str) {
        self.down.lock().insert(id.to_string());
    }

    pub fn bring_up(&self, id: &str) {
        self.down.lock().remove(id);
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn forward(&self, endpoint: &Endpoint, request: ForwardRequest) -> Result<ForwardResponse> {
        self.calls.lock().push(endpoint.id().to_string());
        if self.down.lock().contains(endpoint.id()) {
            return Err(AppError::BackendUnavailable {
                endpoint: endpoint.id().to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let body = json!({
            "service": endpoint.id(),
            "method": request.method.as_str(),
            "path": request.path_and_query,
            "body": String::from_utf8_lossy(&request.body),
            "request_id": request.headers.get("x-request-id").and_then(|v| v.to_str().ok()),
            "host": request.headers.get(header::HOST).and_then(|v| v.to_str().ok()),
        });

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(ForwardResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(body.to_string()),
        })
    }

    async fn health_check(&self, endpoint: &Endpoint) -> bool {
        *self.probes.lock() += 1;
        !self.down.lock().contains(endpoint.id())
    }
}

pub struct TestGateway {
    pub state: Arc<AppState>,
    pub backend: Arc<FakeBackend>,
    pub clock: Arc<ManualClock>,
    pub app: Router,
}

/// Settings with one backend per id, keyed by `X-Forwarded-For`
pub fn settings(ids: &[&str]) -> Settings {
    let mut settings = Settings::default();
    settings.rate_limit.client_identity = ClientIdentitySource::ForwardedFor;
    settings.backends = ids
        .iter()
        .enumerate()
        .map(|(i, id)| BackendConfig::new(*id, format!("http://127.0.0.1:{}", 18001 + i)))
        .collect();
    settings
}

/// A gateway over a fake pool where every backend has passed a probe
pub async fn gateway(settings: Settings) -> TestGateway {
    let backend = Arc::new(FakeBackend::default());
    let clock = Arc::new(ManualClock::new());
    let state = Arc::new(AppState::with_clock(settings, backend.clone(), clock.clone()).unwrap());
    state.health_prober.probe_all().await;
    let app = create_router(state.clone());

    TestGateway {
        state,
        backend,
        clock,
        app,
    }
}

pub fn request(method: &str, uri: &str, client: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}
