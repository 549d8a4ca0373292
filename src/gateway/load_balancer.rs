//! Round-robin load balancer over the healthy endpoints of the registry

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::backend::registry::ServiceRegistry;
use crate::backend::traits::Endpoint;
use crate::error::{AppError, Result};

/// Load balancer for distributing requests across backends
pub struct LoadBalancer {
    registry: Arc<ServiceRegistry>,
    cursor: Mutex<usize>,
}

impl LoadBalancer {
    /// Create a new load balancer
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            cursor: Mutex::new(0),
        }
    }

    /// Select the next healthy endpoint.
    ///
    /// The healthy view is taken under the cursor lock, so concurrent callers
    /// each get a distinct position in the rotation. The cursor is kept
    /// reduced modulo the size of the view at the time of the call.
    pub fn select_endpoint(&self) -> Result<Arc<Endpoint>> {
        let mut cursor = self.cursor.lock();
        let healthy = self.registry.healthy_endpoints();

        if healthy.is_empty() {
            return Err(AppError::NoHealthyEndpoints);
        }

        let selected = healthy[*cursor % healthy.len()].clone();
        *cursor = (*cursor + 1) % healthy.len();

        debug!(
            endpoint = %selected.id(),
            healthy = healthy.len(),
            "Selected backend for request"
        );

        Ok(selected)
    }

    /// Current rotation position
    pub fn cursor(&self) -> usize {
        *self.cursor.lock()
    }
}
