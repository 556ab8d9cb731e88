//! In-memory [`DocumentStore`] that wires one [`EngineModel`] per schema.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use schemapi_core::{ClockSource, Schema, SystemClock};
use tracing::debug;

use crate::storage::engines::MemoryEngine;
use crate::storage::model::EngineModel;
use crate::traits::{DocumentStore, ModelHandle};

/// Document store keeping every collection in memory.
///
/// Each schema gets a fresh [`MemoryEngine`] engine on first request;
/// later requests for the same collection name return the same model.
pub struct MemoryStore {
    clock: Arc<dyn ClockSource>,
    models: DashMap<String, Arc<EngineModel>>,
}

impl MemoryStore {
    /// Creates an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store stamping record metadata with the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            clock,
            models: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn model(&self, schema: &Schema) -> anyhow::Result<Arc<dyn ModelHandle>> {
        let model = self
            .models
            .entry(schema.name.clone())
            .or_insert_with(|| {
                debug!(collection = %schema.name, "creating in-memory collection");
                Arc::new(EngineModel::new(
                    schema.name.clone(),
                    Arc::new(MemoryEngine::new()),
                    Arc::clone(&self.clock),
                ))
            })
            .clone();
        Ok(model)
    }
}
