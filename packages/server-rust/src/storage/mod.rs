//! Document storage for the `SchemAPI` server.
//!
//! Two layers back the [`DocumentStore`](crate::traits::DocumentStore) and
//! [`ModelHandle`](crate::traits::ModelHandle) capabilities:
//!
//! - **Engine** ([`StorageEngine`]): synchronous in-memory key-value storage
//!   of [`Record`]s for one collection
//! - **Model** ([`EngineModel`]): query evaluation, paging, identifier
//!   generation, and metadata bookkeeping on top of an engine
//!
//! [`MemoryStore`] hands out one model per schema.

pub mod engine;
pub mod engines;
pub mod factory;
pub mod model;
pub mod record;

pub use engine::*;
pub use factory::MemoryStore;
pub use model::EngineModel;
pub use record::*;
