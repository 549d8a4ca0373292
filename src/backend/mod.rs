//! Backend module - Endpoint types, HTTP client, and service registry

pub mod http_backend;
pub mod registry;
pub mod traits;
