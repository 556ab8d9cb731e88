//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown signal fires.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    collection_routes, health_handler, liveness_handler, readiness_handler, AppState,
};
use super::middleware::{inject_dev_identity, track_in_flight, with_http_layers};
use super::shutdown::ShutdownController;
use crate::service::{Api, Environment};

/// Upper bound on waiting for in-flight requests after the listener closes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates the shutdown controller
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- serves until shutdown is signalled, then drains
pub struct NetworkModule {
    config: NetworkConfig,
    api: Arc<Api>,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, api: Arc<Api>) -> Self {
        Self {
            config,
            api,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    /// - the REST routes of every registered collection
    pub fn build_router(&self) -> Router {
        let state = AppState {
            api: Arc::clone(&self.api),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };

        let mut api_routes = collection_routes(&self.api, self.config.error_status_codes);
        match (&self.config.dev_identity, self.api.config().environment) {
            (Some(principal), Environment::Development) => {
                warn!(user = %principal.id, "attaching development identity to unauthenticated requests");
                api_routes =
                    api_routes.layer(from_fn_with_state(principal.clone(), inject_dev_identity));
            }
            (Some(principal), environment) => {
                error!(
                    user = %principal.id,
                    %environment,
                    "development identity ignored outside development"
                );
            }
            (None, _) => {}
        }
        let api_routes =
            api_routes.layer(from_fn_with_state(Arc::clone(&self.shutdown), track_in_flight));

        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .with_state(state)
            .merge(api_routes);
        with_http_layers(router, &self.config)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 asks for an OS-assigned port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// When the signal fires the health state moves to Draining, so new
    /// collection requests get 503 while open ones finish. After the listener
    /// closes the server waits for in-flight requests and closes the store.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let shutdown_ctrl = self.shutdown;

        shutdown_ctrl.set_ready();
        info!(collections = self.api.registry().len(), "serving HTTP");

        let signal_ctrl = Arc::clone(&shutdown_ctrl);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown requested");
                signal_ctrl.trigger_shutdown();
            })
            .await?;

        if shutdown_ctrl.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("all requests drained");
        } else {
            warn!("drain timeout expired with in-flight requests remaining");
        }
        self.api.close().await
    }
}
