//! Middleware module - Client identity resolution

pub mod client_identity;
