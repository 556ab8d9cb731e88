//! HTTP middleware for the `SchemAPI` server.
//!
//! [`with_http_layers`] wraps the whole router; the two `from_fn` middlewares
//! below only wrap the collection routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use schemapi_core::Principal;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use super::shutdown::ShutdownController;

const REQUEST_ID: &str = "x-request-id";

/// Wraps `router` in the HTTP-level layers.
///
/// Seen from an incoming request, outermost first:
/// 1. `SetRequestId` -- assigns a UUID v4 `X-Request-Id`
/// 2. `Trace` -- request/response spans
/// 3. `Compression` -- gzip
/// 4. `CORS` -- configured origins, REST verbs only
/// 5. `Timeout` -- 408 once `request_timeout` elapses
/// 6. `PropagateRequestId` -- echoes `X-Request-Id` on the response
///
/// `Router::layer` wraps from the inside out, hence the reversed calls.
#[must_use]
pub fn with_http_layers(router: Router, config: &NetworkConfig) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID);
    router
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(build_cors_layer(&config.cors_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// A wildcard `"*"` allows any origin; otherwise each entry is parsed into
/// an explicit allowlist and unparsable entries are dropped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Attaches the configured development identity to requests that carry none.
///
/// An identity set by an outer authentication layer always wins.
pub async fn inject_dev_identity(
    State(principal): State<Principal>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<Principal>().is_none() {
        request.extensions_mut().insert(principal);
    }
    next.run(request).await
}

/// Counts the request as in flight and refuses new work while draining.
pub async fn track_in_flight(
    State(shutdown): State<Arc<ShutdownController>>,
    request: Request,
    next: Next,
) -> Response {
    if !shutdown.is_accepting() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "message": "server is shutting down" })),
        )
            .into_response();
    }
    let _guard = shutdown.in_flight_guard();
    next.run(request).await
}
