//! HTTP handlers

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::backend::registry::EndpointStatus;
use crate::backend::traits::{ForwardRequest, HealthState};
use crate::error::{reset_timestamp, Result};
use crate::middleware::client_identity::ClientId;
use crate::AppState;

const GATEWAY_NAME: &str = "api-gateway";
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn client_or_unknown(client: Option<Extension<ClientId>>) -> ClientId {
    client
        .map(|Extension(id)| id)
        .unwrap_or_else(|| ClientId::from(ClientId::UNKNOWN))
}

/// Gateway information
pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let limits = &state.settings.rate_limit;
    Json(json!({
        "service": GATEWAY_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "features": [
            "Load Balancing (Round Robin)",
            format!("Rate Limiting ({} req/{}s per client)", limits.max_requests, limits.window_secs),
            "Health Checks",
            "Request Forwarding",
        ],
        "backend_services": state.registry.len(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Gateway liveness; never consults the backends
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": GATEWAY_NAME,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
pub struct RateLimitSummary {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub gateway: &'static str,
    pub load_balancing: &'static str,
    pub rate_limiting: RateLimitSummary,
    pub total_services: usize,
    pub healthy_services: usize,
    pub services: Vec<EndpointStatus>,
}

/// Registered backends and their health
pub async fn list_services(State(state): State<Arc<AppState>>) -> Json<ServicesResponse> {
    let services = state.registry.snapshot();
    let limits = &state.settings.rate_limit;

    Json(ServicesResponse {
        gateway: GATEWAY_NAME,
        load_balancing: "round_robin",
        rate_limiting: RateLimitSummary {
            enabled: limits.enabled,
            max_requests: limits.max_requests,
            window_secs: limits.window_secs,
        },
        total_services: services.len(),
        healthy_services: services
            .iter()
            .filter(|s| s.state == HealthState::Healthy)
            .count(),
        services,
    })
}

/// Caller's quota and balancer position
pub async fn stats(
    State(state): State<Arc<AppState>>,
    client: Option<Extension<ClientId>>,
) -> Json<Value> {
    let client = client_or_unknown(client);
    let limiter = &state.rate_limiter;
    let quota = limiter.status(client.as_str(), limiter.now());

    Json(json!({
        "gateway": GATEWAY_NAME,
        "rate_limiting": {
            "enabled": state.settings.rate_limit.enabled,
            "max_requests": quota.limit,
            "window_secs": limiter.window().as_secs(),
            "client": client.as_str(),
            "remaining_requests": quota.remaining,
            "reset_in_seconds": quota.reset_after.as_secs(),
            "tracked_clients": limiter.tracked_clients(),
        },
        "load_balancing": {
            "algorithm": "round_robin",
            "cursor": state.load_balancer.cursor(),
            "total_services": state.registry.len(),
            "healthy_services": state.registry.healthy_count(),
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Probe one backend now
pub async fn probe_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let health = state.health_prober.check_now(&id).await?;
    info!(endpoint = %id, state = %health, "On-demand probe");
    Ok(Json(json!({ "id": id, "state": health })))
}

#[derive(Debug, Deserialize)]
pub struct SetHealthRequest {
    pub state: HealthState,
}

/// Manually override a backend's health until the next probe
pub async fn set_service_health(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SetHealthRequest>,
) -> Result<Json<Value>> {
    let previous = state.registry.set_health(&id, request.state)?;
    info!(endpoint = %id, from = %previous, to = %request.state, "Manual health override");
    Ok(Json(json!({ "id": id, "previous": previous, "state": request.state })))
}

/// Forward a request to the next healthy backend
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    client: Option<Extension<ClientId>>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let client = client_or_unknown(client);

    let prefix = state.settings.proxy.route_prefix.as_str();
    let path = uri.path().strip_prefix(prefix).unwrap_or(uri.path());
    let path = if path.is_empty() { "/" } else { path };
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    if !headers.contains_key(&X_REQUEST_ID) {
        if let Ok(value) = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
            headers.insert(X_REQUEST_ID, value);
        }
    }

    let request = ForwardRequest {
        method,
        path_and_query,
        headers,
        body,
    };

    let proxied = state.router.handle(&client, request).await?;

    let mut response = Response::new(Body::from(proxied.response.body));
    *response.status_mut() = proxied.response.status;
    *response.headers_mut() = proxied.response.headers;

    let headers = response.headers_mut();
    headers.insert("x-gateway", HeaderValue::from_static(GATEWAY_NAME));
    headers.insert("x-load-balancer", HeaderValue::from_static("round-robin"));
    if let Ok(id) = HeaderValue::from_str(proxied.endpoint.id()) {
        headers.insert("x-backend-service", id);
    }
    if let Some(quota) = proxied.quota {
        headers.insert("x-ratelimit-limit", HeaderValue::from(quota.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(quota.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(reset_timestamp(quota.reset_after)));
    }

    Ok(response.into_response())
}
