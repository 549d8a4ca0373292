//! API Gateway
//!
//! Request-routing gateway in front of a pool of interchangeable backend
//! services, with health-aware round-robin load balancing and per-client
//! fixed-window rate limiting.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;

pub use error::{AppError, Result};

use std::sync::Arc;

use crate::config::Settings;
use backend::{registry::ServiceRegistry, traits::BackendClient};
use gateway::{
    health_check::{HealthProber, ProbeConfig},
    load_balancer::LoadBalancer,
    rate_limiter::{Clock, RateLimiter, SystemClock},
    router::{GatewayRouter, RouterConfig},
};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ServiceRegistry>,
    pub load_balancer: Arc<LoadBalancer>,
    pub health_prober: Arc<HealthProber>,
    pub rate_limiter: Arc<RateLimiter>,
    pub router: Arc<GatewayRouter>,
}

impl AppState {
    /// Wire up the gateway components from settings
    pub fn new(settings: Settings, backend: Arc<dyn BackendClient>) -> Result<Self> {
        Self::with_clock(settings, backend, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit rate-limit clock
    pub fn with_clock(
        settings: Settings,
        backend: Arc<dyn BackendClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        settings.validate()?;

        let registry = Arc::new(ServiceRegistry::from_config(&settings.backends)?);
        let load_balancer = Arc::new(LoadBalancer::new(registry.clone()));
        let health_prober = Arc::new(HealthProber::new(
            registry.clone(),
            backend.clone(),
            ProbeConfig::from(&settings.health_check),
        ));
        let rate_limiter = Arc::new(RateLimiter::with_clock(
            settings.rate_limit.max_requests,
            settings.rate_limit.window(),
            clock,
        ));
        let router = Arc::new(GatewayRouter::new(
            registry.clone(),
            load_balancer.clone(),
            rate_limiter.clone(),
            backend,
            RouterConfig {
                forward_timeout: settings.proxy.timeout(),
                rate_limit_enabled: settings.rate_limit.enabled,
            },
        ));

        Ok(Self {
            settings: Arc::new(settings),
            registry,
            load_balancer,
            health_prober,
            rate_limiter,
            router,
        })
    }
}
