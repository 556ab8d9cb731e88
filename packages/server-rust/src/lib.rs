//! `SchemAPI` server: schema-driven REST collections with a hook pipeline around every operation.

pub mod network;
pub mod service;
pub mod storage;
pub mod traits;

pub use service::{Api, ApiConfig, Collection, OperationError};
pub use storage::MemoryStore;
pub use traits::{DocumentStore, ModelHandle, StoreError};
