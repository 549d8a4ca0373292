//! Client identity resolution middleware
//!
//! Resolves the key used for rate limiting according to the configured
//! policy and stores it as a [`ClientId`] request extension.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    response::Response,
};
use futures::future::BoxFuture;
use std::{
    fmt,
    net::SocketAddr,
    task::{Context, Poll},
};
use tower::{Layer, Service};

use crate::config::ClientIdentitySource;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Opaque client identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the client identity of a request under `source`
pub fn resolve_client_id(
    source: ClientIdentitySource,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> ClientId {
    let forwarded = match source {
        ClientIdentitySource::ForwardedFor => headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        ClientIdentitySource::PeerAddr => None,
    };

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .map(ClientId)
        .unwrap_or_else(|| ClientId::from(ClientId::UNKNOWN))
}

/// Client identity layer
#[derive(Clone)]
pub struct ClientIdentityLayer {
    source: ClientIdentitySource,
}

impl ClientIdentityLayer {
    pub fn new(source: ClientIdentitySource) -> Self {
        Self { source }
    }
}

impl<S> Layer<S> for ClientIdentityLayer {
    type Service = ClientIdentityMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientIdentityMiddleware {
            inner,
            source: self.source,
        }
    }
}

/// Client identity middleware service
#[derive(Clone)]
pub struct ClientIdentityMiddleware<S> {
    inner: S,
    source: ClientIdentitySource,
}

impl<S> Service<Request<Body>> for ClientIdentityMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let client_id = resolve_client_id(self.source, request.headers(), peer);
        request.extensions_mut().insert(client_id);

        let future = self.inner.call(request);
        Box::pin(future)
    }
}
