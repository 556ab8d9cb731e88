//! Collection operations and the hook pipeline.
//!
//! 1. **Hooks** (`hooks`): listener tables for the global and local scopes
//! 2. **Pipeline** (`pipeline`): before-global, before-local, action,
//!    after-local, after-global
//! 3. **Collections** (`collection`): the ten operations of one schema
//! 4. **Registry** (`registry`): name to collection, no duplicates
//! 5. **Api** (`api`): builds collections from schemas and owns the global scope

pub mod api;
pub mod collection;
pub mod config;
pub mod event;
pub mod hooks;
pub mod operation;
pub mod pipeline;
pub mod registry;

pub use api::Api;
pub use collection::Collection;
pub use config::{ApiConfig, Environment};
pub use event::{Event, EventHandle};
pub use hooks::{HookSet, Listener, Scope};
pub use operation::OperationError;
pub use pipeline::Pipeline;
pub use registry::CollectionRegistry;
