//! Gateway router: rate limit, select, forward, relay

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::registry::ServiceRegistry;
use crate::backend::traits::{BackendClient, Endpoint, ForwardRequest, ForwardResponse, HealthState};
use crate::error::{AppError, Result};
use crate::gateway::load_balancer::LoadBalancer;
use crate::gateway::rate_limiter::{Admission, Quota, RateLimiter};
use crate::middleware::client_identity::ClientId;

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Upper bound on a single forwarded request
    pub forward_timeout: Duration,
    pub rate_limit_enabled: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            forward_timeout: Duration::from_secs(10),
            rate_limit_enabled: true,
        }
    }
}

/// A relayed backend response
#[derive(Debug)]
pub struct Proxied {
    pub endpoint: Arc<Endpoint>,
    pub response: ForwardResponse,
    /// Caller's remaining quota, when rate limiting is enabled
    pub quota: Option<Quota>,
}

/// Entry point for proxied requests
pub struct GatewayRouter {
    registry: Arc<ServiceRegistry>,
    load_balancer: Arc<LoadBalancer>,
    rate_limiter: Arc<RateLimiter>,
    backend: Arc<dyn BackendClient>,
    config: RouterConfig,
}

impl GatewayRouter {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        load_balancer: Arc<LoadBalancer>,
        rate_limiter: Arc<RateLimiter>,
        backend: Arc<dyn BackendClient>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            load_balancer,
            rate_limiter,
            backend,
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Handle one proxied request.
    ///
    /// A failed forward marks the endpoint unhealthy and is reported to the
    /// caller; it is not retried against another endpoint.
    pub async fn handle(&self, client: &ClientId, request: ForwardRequest) -> Result<Proxied> {
        let quota = if self.config.rate_limit_enabled {
            match self.rate_limiter.check(client.as_str()) {
                Admission::Admitted { remaining, reset_after } => Some(Quota {
                    limit: self.rate_limiter.limit(),
                    remaining,
                    reset_after,
                }),
                Admission::Rejected { retry_after } => {
                    warn!(client = %client, retry_after_ms = retry_after.as_millis() as u64, "Rate limit exceeded");
                    return Err(AppError::RateLimitExceeded {
                        limit: self.rate_limiter.limit(),
                        retry_after,
                    });
                }
            }
        } else {
            None
        };

        let endpoint = self.load_balancer.select_endpoint().map_err(|e| {
            warn!(client = %client, "No healthy backend for request");
            e
        })?;

        let method = request.method.clone();
        let path = request.path_and_query.clone();

        let outcome = tokio::time::timeout(
            self.config.forward_timeout,
            self.backend.forward(&endpoint, request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(AppError::BackendTimeout {
                endpoint: endpoint.id().to_string(),
                timeout: self.config.forward_timeout,
            })
        });

        match outcome {
            Ok(response) => {
                info!(
                    client = %client,
                    endpoint = %endpoint.id(),
                    method = %method,
                    path = %path,
                    status = response.status.as_u16(),
                    "Proxied request"
                );
                Ok(Proxied {
                    endpoint,
                    response,
                    quota,
                })
            }
            Err(e) if e.is_forwarding_failure() => {
                warn!(endpoint = %endpoint.id(), error = %e, "Forwarding failed, marking endpoint unhealthy");
                if let Err(mark_err) = self.registry.set_health(endpoint.id(), HealthState::Unhealthy) {
                    warn!(endpoint = %endpoint.id(), error = %mark_err, "Failed to downgrade endpoint");
                }
                Err(e)
            }
            Err(e) => {
                debug!(endpoint = %endpoint.id(), error = %e, "Request rejected before reaching backend");
                Err(e)
            }
        }
    }
}
