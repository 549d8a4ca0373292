//! Common traits and types for backend services

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

/// One backend service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    id: String,
    url: Url,
}

impl Endpoint {
    /// Create an endpoint from a stable identifier and an absolute base URL
    pub fn new(id: impl Into<String>, base_url: &str) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::InvalidEndpoint("endpoint id cannot be empty".to_string()));
        }

        let url = Url::parse(base_url)
            .map_err(|e| AppError::InvalidEndpoint(format!("{}: '{}': {}", id, base_url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::InvalidEndpoint(format!(
                "{}: unsupported scheme '{}'",
                id,
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(AppError::InvalidEndpoint(format!("{}: missing host", id)));
        }

        Ok(Self { id, url })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port, falling back to the scheme default
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    /// Absolute URL for a path (and query) on this backend
    pub fn target(&self, path_and_query: &str) -> String {
        let base = self.url.as_str().trim_end_matches('/');
        if path_and_query.starts_with('/') {
            format!("{}{}", base, path_and_query)
        } else {
            format!("{}/{}", base, path_and_query)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.url)
    }
}

/// Last-known liveness of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A request as it is sent to the selected backend
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Path relative to the backend base URL, including the query string
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Backend response relayed to the client
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Headers that describe a single transport hop and must not be forwarded
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

/// Drop hop-by-hop headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove(header::CONTENT_LENGTH);
}

/// Transport used to reach backend services
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Forward a request to the endpoint and return whatever it answered.
    ///
    /// Only transport failures are errors; any HTTP status is a response.
    async fn forward(&self, endpoint: &Endpoint, request: ForwardRequest) -> Result<ForwardResponse>;

    /// Check if the endpoint reports itself ready
    async fn health_check(&self, endpoint: &Endpoint) -> bool;
}
