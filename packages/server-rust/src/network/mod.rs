//! HTTP surface: configuration, middleware, route handlers, and shutdown control.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::{collection_routes, ApiResponse, AppState};
pub use module::NetworkModule;
pub use shutdown::*;
