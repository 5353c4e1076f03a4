//! HTTP gateway for a taskmesh runtime.
//!
//! Exposes agent registration, task submission and system status as a JSON
//! API. Errors render as `{"error": {"message", "statusCode"}}`.

/// Error type and status mapping.
pub mod error;
/// API key middleware.
pub mod middleware;
mod routes;
/// Router assembly.
pub mod server;

pub use error::ApiError;
pub use middleware::{AuthConfig, API_KEY_HEADER};
pub use server::{build_cors_layer, GatewayConfig, GatewayServer};
