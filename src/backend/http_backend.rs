//! HTTP backend client implementation

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use reqwest::{redirect, Client};
use std::time::Duration;
use tracing::debug;

use crate::backend::traits::{strip_hop_by_hop, BackendClient, Endpoint, ForwardRequest, ForwardResponse};
use crate::config::Settings;
use crate::error::{AppError, Result};

/// `BackendClient` speaking plain HTTP through a pooled `reqwest` client
pub struct HttpBackendClient {
    client: Client,
    health_check_path: String,
    health_check_timeout: Duration,
    forward_timeout: Duration,
}

impl HttpBackendClient {
    /// Create a new HTTP backend client from configuration
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.health_check.timeout().min(settings.proxy.timeout()))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            health_check_path: settings.health_check.path.clone(),
            health_check_timeout: settings.health_check.timeout(),
            forward_timeout: settings.proxy.timeout(),
        })
    }
}

/// Copy headers between the server-side and client-side `http` versions
fn to_reqwest_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut converted = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            converted.append(name, value);
        }
    }
    converted
}

fn from_reqwest_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut converted = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            converted.append(name, value);
        }
    }
    converted
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn forward(&self, endpoint: &Endpoint, request: ForwardRequest) -> Result<ForwardResponse> {
        let url = endpoint.target(&request.path_and_query);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| AppError::InvalidRequest(format!("Unsupported method: {}", e)))?;

        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);

        debug!(endpoint = %endpoint.id(), method = %method, url = %url, "Forwarding request");

        let unavailable = |e: reqwest::Error| {
            if e.is_timeout() {
                AppError::BackendTimeout {
                    endpoint: endpoint.id().to_string(),
                    timeout: self.forward_timeout,
                }
            } else {
                AppError::BackendUnavailable {
                    endpoint: endpoint.id().to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .request(method, &url)
            .headers(to_reqwest_headers(&headers))
            .body(request.body)
            .timeout(self.forward_timeout)
            .send()
            .await
            .map_err(unavailable)?;

        let status = StatusCode::from_u16(response.status().as_u16()).map_err(|e| {
            AppError::BackendUnavailable {
                endpoint: endpoint.id().to_string(),
                reason: format!("invalid status: {}", e),
            }
        })?;
        let mut headers = from_reqwest_headers(response.headers());
        strip_hop_by_hop(&mut headers);
        let body = response.bytes().await.map_err(unavailable)?;

        Ok(ForwardResponse { status, headers, body })
    }

    async fn health_check(&self, endpoint: &Endpoint) -> bool {
        let url = endpoint.target(&self.health_check_path);

        match self
            .client
            .get(&url)
            .timeout(self.health_check_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(endpoint = %endpoint.id(), "Health check passed");
                true
            }
            Ok(response) => {
                debug!(
                    endpoint = %endpoint.id(),
                    status = %response.status(),
                    "Health check failed"
                );
                false
            }
            Err(e) => {
                debug!(
                    endpoint = %endpoint.id(),
                    error = %e,
                    "Health check failed"
                );
                false
            }
        }
    }
}
