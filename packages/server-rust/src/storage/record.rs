//! Record types for the storage layer.
//!
//! A [`Record`] pairs a stored [`Document`] with server-internal metadata that
//! is never returned to callers.

use schemapi_core::Document;

/// Metadata tracked for every stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Insertion sequence number; defines the store's default order.
    pub sequence: u64,
    /// Record version, incremented on every update.
    pub version: u32,
    /// Wall-clock time (millis since epoch) when this record was created.
    pub creation_time: i64,
    /// Wall-clock time of the last write.
    pub last_update_time: i64,
}

impl RecordMetadata {
    /// Creates metadata for a newly inserted record. Version starts at 1.
    #[must_use]
    pub fn new(sequence: u64, now: i64) -> Self {
        Self {
            sequence,
            version: 1,
            creation_time: now,
            last_update_time: now,
        }
    }

    /// Records a write: increments `version` and updates `last_update_time`.
    pub fn on_update(&mut self, now: i64) {
        self.version = self.version.saturating_add(1);
        self.last_update_time = now;
    }
}

/// A stored document plus server-internal metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub document: Document,
    pub metadata: RecordMetadata,
}
