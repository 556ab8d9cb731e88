//! Programmatic entry point: schemas in, collections and routes out.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use schemapi_core::{Action, ClockSource, Document, HookPhase, Principal, Schema, SystemClock};
use tracing::{error, info};

use super::collection::Collection;
use super::config::ApiConfig;
use super::event::EventHandle;
use super::hooks::{HookSet, Scope};
use super::operation::OperationError;
use super::registry::CollectionRegistry;
use crate::network::handlers::collection_routes;
use crate::traits::DocumentStore;

/// A set of collections sharing one document store and one global hook scope.
pub struct Api {
    registry: Arc<CollectionRegistry>,
    hooks: Arc<HookSet>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn ClockSource>,
    config: Arc<ApiConfig>,
}

impl Api {
    /// Creates an API without collections.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: ApiConfig) -> Self {
        Self {
            registry: Arc::new(CollectionRegistry::new()),
            hooks: Arc::new(HookSet::new(Scope::Global)),
            store,
            clock: Arc::new(SystemClock),
            config: Arc::new(config),
        }
    }

    /// Replaces the clock used for `createDate` stamps of collections
    /// registered afterwards.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Initializes the store and registers every schema, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to initialize or to provide a model.
    pub async fn from_schemas(
        schemas: impl IntoIterator<Item = Schema>,
        store: Arc<dyn DocumentStore>,
        config: ApiConfig,
    ) -> anyhow::Result<Self> {
        store.initialize().await?;
        let api = Self::new(store, config);
        for schema in schemas {
            api.register(schema).await?;
        }
        Ok(api)
    }

    /// Registers a collection for `schema`.
    ///
    /// A name that is already registered is logged and skipped; the existing
    /// collection keeps serving. Returns the new collection, or `None` for a
    /// skipped duplicate.
    ///
    /// # Errors
    ///
    /// Returns an error if the name cannot be mounted as a route segment, or
    /// if the store cannot provide a model for the schema.
    pub async fn register(&self, schema: Schema) -> anyhow::Result<Option<Arc<Collection>>> {
        check_name(&schema.name)?;
        if self.registry.contains(&schema.name) {
            error!(collection = %schema.name, "collection already exists; keeping the original");
            return Ok(None);
        }

        let model = self.store.model(&schema).await?;
        let collection = Collection::new(
            schema,
            model,
            Arc::clone(&self.hooks),
            Arc::clone(&self.clock),
            Arc::clone(&self.config),
        );

        match self.registry.register(collection) {
            Ok(collection) => {
                info!(collection = %collection.name(), "collection registered");
                Ok(Some(collection))
            }
            Err(err) => {
                error!(error = %err, "collection registration rejected");
                Ok(None)
            }
        }
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.registry.lookup(name)
    }

    #[must_use]
    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// The global hook scope.
    #[must_use]
    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Registers a global `before.<action>` listener; it runs ahead of every
    /// collection's local listeners.
    pub fn before<F, Fut>(&self, action: Action, listener: F)
    where
        F: Fn(EventHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        self.hooks.on(HookPhase::Before, action, listener);
    }

    /// Registers a global `after.<action>` listener; it runs once every
    /// collection's local listeners are done.
    pub fn after<F, Fut>(&self, action: Action, listener: F)
    where
        F: Fn(EventHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        self.hooks.on(HookPhase::After, action, listener);
    }

    /// Every collection's documents keyed by collection name, each loaded
    /// through its `getAll` pipeline. Collections that fail are logged and
    /// left out.
    pub async fn snapshot(&self, user: Option<&Principal>) -> Document {
        let mut out = Document::new();
        for collection in self.registry.collections() {
            match collection.get_all(user).await {
                Ok(payload) => {
                    out.insert(collection.name().to_string(), payload.to_json());
                }
                Err(err) => {
                    error!(collection = %collection.name(), error = %err, "snapshot failed");
                }
            }
        }
        out
    }

    /// REST routes for every registered collection, answering errors with
    /// status 200 and the error envelope.
    #[must_use]
    pub fn router(&self) -> Router {
        collection_routes(self, false)
    }

    /// Closes the underlying document store.
    ///
    /// # Errors
    ///
    /// Returns the store's close error.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.store.close().await
    }
}

/// Route prefixes owned by the server itself.
const RESERVED_NAMES: &[&str] = &["health"];

fn check_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        anyhow::bail!("collection name must not be empty");
    }
    if name.contains(['/', '{', '}', '*', '?', '#']) {
        anyhow::bail!("collection name `{name}` is not a valid path segment");
    }
    // The router treats a segment opening with `:` or `*` as a parameter.
    if name.starts_with([':', '*']) {
        anyhow::bail!("collection name `{name}` must not start with `:` or `*`");
    }
    if RESERVED_NAMES.contains(&name) {
        anyhow::bail!("collection name `{name}` is reserved");
    }
    Ok(())
}
