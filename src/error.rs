//! Common error types for the gateway

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Endpoint already registered: {0}")]
    DuplicateEndpoint(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Rate limit exceeded. Maximum {limit} requests per window")]
    RateLimitExceeded { limit: u32, retry_after: Duration },

    #[error("No healthy backend services available")]
    NoHealthyEndpoints,

    #[error("Failed to reach backend '{endpoint}': {reason}")]
    BackendUnavailable { endpoint: String, reason: String },

    #[error("Backend '{endpoint}' did not respond within {}ms", .timeout.as_millis())]
    BackendTimeout { endpoint: String, timeout: Duration },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error was caused by the selected backend rather than by
    /// the caller or the gateway itself.
    pub fn is_forwarding_failure(&self) -> bool {
        matches!(
            self,
            AppError::BackendUnavailable { .. } | AppError::BackendTimeout { .. } | AppError::HttpClient(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::HttpClient(_) | AppError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AppError::InvalidEndpoint(_) | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateEndpoint(_) => StatusCode::CONFLICT,
            AppError::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NoHealthyEndpoints => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Whole seconds a client should wait, never less than one.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    let secs = if retry_after.subsec_nanos() > 0 { secs.saturating_add(1) } else { secs };
    secs.max(1)
}

/// Unix timestamp (seconds) at which a window reset `after` from now happens.
pub fn reset_timestamp(after: Duration) -> u64 {
    SystemTime::now()
        .checked_add(after)
        .map_or(u64::MAX, |at| {
            at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
        })
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_type, code) = match &self {
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => ("server_error", None),
            AppError::HttpClient(_) => ("backend_error", None),
            AppError::InvalidEndpoint(_) => ("invalid_request_error", Some("invalid_endpoint")),
            AppError::DuplicateEndpoint(_) => ("invalid_request_error", Some("duplicate_endpoint")),
            AppError::UnknownEndpoint(_) => ("not_found_error", Some("unknown_endpoint")),
            AppError::RateLimitExceeded { .. } => ("rate_limit_error", Some("rate_limit_exceeded")),
            AppError::NoHealthyEndpoints => ("server_error", Some("no_healthy_endpoints")),
            AppError::BackendUnavailable { .. } => ("backend_error", Some("backend_unavailable")),
            AppError::BackendTimeout { .. } => ("timeout_error", Some("backend_timeout")),
            AppError::InvalidRequest(_) => ("invalid_request_error", None),
        };

        let retry_after = match &self {
            AppError::RateLimitExceeded { limit, retry_after } => Some((*limit, *retry_after)),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
                retry_after: retry_after.map(|(_, after)| retry_after_secs(after)),
            },
        });

        let mut response = (status, body).into_response();

        if let Some((limit, after)) = retry_after {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(after)));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset_timestamp(after)));
        }

        response
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
