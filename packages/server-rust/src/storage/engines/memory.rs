//! [`DashMap`]-backed engine; the only engine shipped in tree.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::storage::engine::StorageEngine;
use crate::storage::record::Record;

/// Keeps records in a sharded concurrent map.
///
/// Scans sort by [`RecordMetadata::sequence`](crate::storage::RecordMetadata)
/// since the map itself is unordered.
#[derive(Default)]
pub struct MemoryEngine {
    records: DashMap<String, Record>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryEngine {
    fn insert_new(&self, key: &str, record: Record) -> Result<(), Record> {
        match self.records.entry(key.to_string()) {
            Entry::Occupied(_) => Err(record),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn get(&self, key: &str) -> Option<Record> {
        self.records.get(key).map(|r| r.value().clone())
    }

    fn modify(&self, key: &str, change: &mut dyn FnMut(&mut Record)) -> Option<Record> {
        let mut stored = self.records.get_mut(key)?;
        change(stored.value_mut());
        Some(stored.value().clone())
    }

    fn remove(&self, key: &str) -> Option<Record> {
        self.records.remove(key).map(|(_, r)| r)
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&self) -> usize {
        let mut removed = 0;
        self.records.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    fn scan(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.metadata.sequence);
        records
    }
}

#[cfg(test)]
mod tests {
    use schemapi_core::Document;
    use serde_json::json;

    use super::*;
    use crate::storage::record::RecordMetadata;

    fn record(sequence: u64, label: &str) -> Record {
        let mut document = Document::new();
        document.insert("label".to_string(), json!(label));
        Record {
            document,
            metadata: RecordMetadata::new(sequence, 0),
        }
    }

    #[test]
    fn insert_new_refuses_taken_key() {
        let engine = MemoryEngine::new();
        assert!(engine.insert_new("a", record(0, "first")).is_ok());

        let rejected = engine.insert_new("a", record(1, "second")).unwrap_err();
        assert_eq!(rejected.document["label"], "second");
        assert_eq!(engine.get("a").unwrap().document["label"], "first");
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn modify_changes_in_place() {
        let engine = MemoryEngine::new();
        engine.insert_new("a", record(0, "before")).unwrap();

        let updated = engine
            .modify("a", &mut |r| {
                r.document.insert("label".into(), json!("after"));
                r.metadata.on_update(5);
            })
            .unwrap();
        assert_eq!(updated.metadata.version, 2);
        assert_eq!(engine.get("a").unwrap().document["label"], "after");

        assert!(engine.modify("missing", &mut |_| {}).is_none());
    }

    #[test]
    fn remove_and_clear() {
        let engine = MemoryEngine::new();
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            engine.insert_new(key, record(i as u64, key)).unwrap();
        }

        assert_eq!(engine.remove("b").unwrap().document["label"], "b");
        assert!(engine.remove("b").is_none());

        assert_eq!(engine.clear(), 2);
        assert!(engine.is_empty());
        assert_eq!(engine.clear(), 0);
    }

    #[test]
    fn scan_follows_insertion_sequence() {
        let engine = MemoryEngine::new();
        for (key, seq) in [("z", 3), ("a", 1), ("m", 2), ("b", 0)] {
            engine.insert_new(key, record(seq, key)).unwrap();
        }

        let keys: Vec<_> = engine
            .scan()
            .into_iter()
            .map(|r| r.document["label"].clone())
            .collect();
        assert_eq!(keys, [json!("b"), json!("a"), json!("m"), json!("z")]);
    }
}
