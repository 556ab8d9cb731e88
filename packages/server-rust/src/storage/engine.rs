//! The innermost storage layer.
//!
//! A [`StorageEngine`] keeps the [`Record`]s of one collection keyed by
//! document identifier. Query evaluation and paging live one layer up in
//! [`EngineModel`](super::EngineModel).

use super::record::Record;

/// Synchronous keyed record storage for one collection.
///
/// Every method is atomic with respect to a single key. Shared across async
/// tasks as `Arc<dyn StorageEngine>`.
pub trait StorageEngine: Send + Sync + 'static {
    /// Stores `record` under a key that is not taken yet. An occupied key
    /// leaves the stored record untouched and hands `record` back.
    ///
    /// # Errors
    ///
    /// Returns the rejected record when `key` already exists.
    fn insert_new(&self, key: &str, record: Record) -> Result<(), Record>;

    fn get(&self, key: &str) -> Option<Record>;

    /// Applies `change` to the stored record in place and returns a copy of
    /// the result, or `None` when nothing is stored under `key`.
    fn modify(&self, key: &str, change: &mut dyn FnMut(&mut Record)) -> Option<Record>;

    fn remove(&self, key: &str) -> Option<Record>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record and returns how many there were.
    fn clear(&self) -> usize;

    /// Point-in-time copy of every record in insertion order.
    fn scan(&self) -> Vec<Record>;
}
