//! HTTP handler definitions for the `SchemAPI` server.
//!
//! Health endpoints share [`AppState`]; collection routes carry their own
//! per-collection state and are assembled by [`collection_routes`].

pub mod collection;
pub mod health;

pub use collection::{collection_routes, ApiResponse};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::Api;

/// Shared state of the health endpoints. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The served collections.
    pub api: Arc<Api>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
