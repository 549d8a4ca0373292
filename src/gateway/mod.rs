//! Gateway module - Load balancing, health probing, rate limiting, and routing

pub mod health_check;
pub mod load_balancer;
pub mod rate_limiter;
pub mod router;
