//! Route table for the gateway

use axum::{
    routing::{any, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::middleware::client_identity::ClientIdentityLayer;
use crate::AppState;

/// Build the gateway's HTTP router
pub fn create_router(state: Arc<AppState>) -> Router {
    let proxy_route = format!("{}/*path", state.settings.proxy.route_prefix);
    let identity = ClientIdentityLayer::new(state.settings.rate_limit.client_identity);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/services", get(handlers::list_services))
        .route("/stats", get(handlers::stats))
        .route("/admin/services/:id/probe", post(handlers::probe_service))
        .route("/admin/services/:id/health", put(handlers::set_service_health))
        .route(&proxy_route, any(handlers::proxy))
        .layer(identity)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
