//! Network configuration types for the `SchemAPI` server.

use std::time::Duration;

use schemapi_core::Principal;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
    /// Answer failed operations with a matching HTTP status instead of 200.
    pub error_status_codes: bool,
    /// Identity attached to requests that arrive without one. Applied only
    /// when the API runs in `Development`; real deployments authenticate in
    /// an outer layer.
    pub dev_identity: Option<Principal>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            error_status_codes: false,
            dev_identity: None,
        }
    }
}
