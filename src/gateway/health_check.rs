//! Health prober for monitoring backend health

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::registry::ServiceRegistry;
use crate::backend::traits::{BackendClient, Endpoint, HealthState};
use crate::config::HealthCheckConfig;
use crate::error::{AppError, Result};

/// Probe timing
#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    pub interval: Duration,
    /// Upper bound on a single endpoint's probe
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
        }
    }
}

impl From<&HealthCheckConfig> for ProbeConfig {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
        }
    }
}

/// Result of one probe cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Health prober
pub struct HealthProber {
    registry: Arc<ServiceRegistry>,
    client: Arc<dyn BackendClient>,
    config: ProbeConfig,
    probe_task: RwLock<Option<JoinHandle<()>>>,
}

impl HealthProber {
    pub fn new(registry: Arc<ServiceRegistry>, client: Arc<dyn BackendClient>, config: ProbeConfig) -> Self {
        Self {
            registry,
            client,
            config,
            probe_task: RwLock::new(None),
        }
    }

    pub fn config(&self) -> ProbeConfig {
        self.config
    }

    /// Start the probing background task. The first cycle runs immediately.
    pub async fn start(&self) {
        let registry = self.registry.clone();
        let client = self.client.clone();
        let config = self.config;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                probe_cycle(&registry, client.as_ref(), config.timeout).await;
            }
        });

        if let Some(previous) = self.probe_task.write().await.replace(handle) {
            previous.abort();
        }
        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Started health probe background task"
        );
    }

    /// Stop the probing background task
    pub async fn stop(&self) {
        if let Some(handle) = self.probe_task.write().await.take() {
            handle.abort();
            info!("Stopped health probe background task");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.probe_task
            .read()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Probe every registered endpoint once, concurrently
    pub async fn probe_all(&self) -> ProbeSummary {
        probe_cycle(&self.registry, self.client.as_ref(), self.config.timeout).await
    }

    /// Force a probe of a specific endpoint
    pub async fn check_now(&self, id: &str) -> Result<HealthState> {
        let endpoint = self
            .registry
            .get(id)
            .ok_or_else(|| AppError::UnknownEndpoint(id.to_string()))?;

        probe_endpoint(&self.registry, self.client.as_ref(), &endpoint, self.config.timeout).await
    }
}

async fn probe_cycle(registry: &ServiceRegistry, client: &dyn BackendClient, timeout: Duration) -> ProbeSummary {
    let endpoints = registry.endpoints();
    let results = join_all(
        endpoints
            .iter()
            .map(|endpoint| probe_endpoint(registry, client, endpoint, timeout)),
    )
    .await;

    let healthy = results
        .iter()
        .filter(|r| matches!(r, Ok(HealthState::Healthy)))
        .count();
    let summary = ProbeSummary {
        total: endpoints.len(),
        healthy,
        unhealthy: endpoints.len() - healthy,
    };

    debug!(
        total = summary.total,
        healthy = summary.healthy,
        unhealthy = summary.unhealthy,
        "Health probe cycle completed"
    );
    summary
}

async fn probe_endpoint(
    registry: &ServiceRegistry,
    client: &dyn BackendClient,
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<HealthState> {
    let state = match time::timeout(timeout, client.health_check(endpoint)).await {
        Ok(true) => HealthState::Healthy,
        Ok(false) => HealthState::Unhealthy,
        Err(_) => {
            warn!(
                endpoint = %endpoint.id(),
                timeout_ms = timeout.as_millis() as u64,
                "Health probe timed out"
            );
            HealthState::Unhealthy
        }
    };

    registry.set_health(endpoint.id(), state)?;
    Ok(state)
}
