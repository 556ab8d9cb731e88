//! Concrete [`StorageEngine`](super::StorageEngine) implementations.

pub mod memory;

pub use memory::MemoryEngine;
