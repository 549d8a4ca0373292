//! Service registry: the ordered set of backend endpoints and their health

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::traits::{Endpoint, HealthState};
use crate::config::BackendConfig;
use crate::error::{AppError, Result};

/// Point-in-time view of one registered endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    pub id: String,
    pub url: String,
    pub state: HealthState,
    /// When `state` last changed
    pub since: DateTime<Utc>,
}

struct Entry {
    endpoint: Arc<Endpoint>,
    state: HealthState,
    since: DateTime<Utc>,
}

/// Registry of backend endpoints in registration order
#[derive(Default)]
pub struct ServiceRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the configured backends, in order
    pub fn from_config(backends: &[BackendConfig]) -> Result<Self> {
        let registry = Self::new();
        for backend in backends {
            registry.register(Endpoint::new(backend.id.clone(), &backend.url)?)?;
        }
        Ok(registry)
    }

    /// Add an endpoint with state `unknown`
    pub fn register(&self, endpoint: Endpoint) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.endpoint.id() == endpoint.id()) {
            return Err(AppError::DuplicateEndpoint(endpoint.id().to_string()));
        }

        info!(endpoint = %endpoint.id(), url = %endpoint.url(), "Registered backend endpoint");
        entries.push(Entry {
            endpoint: Arc::new(endpoint),
            state: HealthState::Unknown,
            since: Utc::now(),
        });
        Ok(())
    }

    /// Update the health state of an endpoint, returning the previous state
    pub fn set_health(&self, id: &str, state: HealthState) -> Result<HealthState> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.endpoint.id() == id)
            .ok_or_else(|| AppError::UnknownEndpoint(id.to_string()))?;

        let previous = entry.state;
        if previous != state {
            entry.state = state;
            entry.since = Utc::now();

            match state {
                HealthState::Healthy => {
                    info!(endpoint = %id, from = %previous, "Backend marked healthy")
                }
                _ => warn!(endpoint = %id, from = %previous, to = %state, "Backend health downgraded"),
            }
        } else {
            debug!(endpoint = %id, state = %state, "Backend health unchanged");
        }

        Ok(previous)
    }

    /// Endpoints currently marked healthy, in registration order
    pub fn healthy_endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.state == HealthState::Healthy)
            .map(|e| e.endpoint.clone())
            .collect()
    }

    /// All endpoints, in registration order
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.entries.read().iter().map(|e| e.endpoint.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Endpoint>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.endpoint.id() == id)
            .map(|e| e.endpoint.clone())
    }

    pub fn health(&self, id: &str) -> Option<HealthState> {
        self.entries
            .read()
            .iter()
            .find(|e| e.endpoint.id() == id)
            .map(|e| e.state)
    }

    /// Read-only view of every endpoint and its health
    pub fn snapshot(&self) -> Vec<EndpointStatus> {
        self.entries
            .read()
            .iter()
            .map(|e| EndpointStatus {
                id: e.endpoint.id().to_string(),
                url: e.endpoint.url().to_string(),
                state: e.state,
                since: e.since,
            })
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.state == HealthState::Healthy)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
