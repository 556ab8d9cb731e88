//! [`ModelHandle`] implementation over a [`StorageEngine`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use schemapi_core::{document_id, ClockSource, Document, PageRequest, Query, ID_FIELD};
use serde_json::Value;
use uuid::Uuid;

use super::engine::StorageEngine;
use super::record::{Record, RecordMetadata};
use crate::traits::{ModelHandle, StoreError};

/// Model handle that keeps one collection's documents in a [`StorageEngine`].
///
/// Generated identifiers are UUID v4 in simple (32 hex digit) form.
pub struct EngineModel {
    name: String,
    engine: Arc<dyn StorageEngine>,
    clock: Arc<dyn ClockSource>,
    next_sequence: AtomicU64,
}

impl EngineModel {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        engine: Arc<dyn StorageEngine>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            clock,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Number of documents currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }

    fn matching(&self, query: &Query) -> impl Iterator<Item = Document> + '_ {
        let query = query.clone();
        self.engine
            .scan()
            .into_iter()
            .map(|r| r.document)
            .filter(move |doc| query.matches(doc))
    }
}

#[async_trait]
impl ModelHandle for EngineModel {
    fn collection(&self) -> &str {
        &self.name
    }

    async fn insert(&self, mut doc: Document) -> Result<Document, StoreError> {
        let id = document_id(&doc).unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let record = Record {
            document: doc.clone(),
            metadata: RecordMetadata::new(sequence, self.clock.now_millis()),
        };
        match self.engine.insert_new(&id, record) {
            Ok(()) => Ok(doc),
            Err(_) => Err(StoreError::new(format!(
                "duplicate key: {} with _id {id} already exists",
                self.name
            ))),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.engine.get(id).map(|r| r.document))
    }

    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        Ok(self.matching(query).collect())
    }

    async fn find_one(&self, query: &Query) -> Result<Option<Document>, StoreError> {
        Ok(self.matching(query).next())
    }

    async fn find_page(
        &self,
        query: &Query,
        page: PageRequest,
    ) -> Result<Vec<Document>, StoreError> {
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let length = usize::try_from(page.length).unwrap_or(usize::MAX);
        Ok(self.matching(query).skip(offset).take(length).collect())
    }

    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        Ok(self.matching(query).count() as u64)
    }

    async fn save(&self, mut doc: Document) -> Result<Document, StoreError> {
        let id = document_id(&doc)
            .ok_or_else(|| StoreError::new(format!("cannot save {} document without _id", self.name)))?;
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let now = self.clock.now_millis();
        let mut replacement = Some(doc);
        let saved = self.engine.modify(&id, &mut |record| {
            if let Some(doc) = replacement.take() {
                record.document = doc;
                record.metadata.on_update(now);
            }
        });
        saved
            .map(|r| r.document)
            .ok_or_else(|| StoreError::new(format!("no {} document with _id {id} to save", self.name)))
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.engine.remove(id).is_some())
    }

    async fn remove_all(&self) -> Result<u64, StoreError> {
        Ok(self.engine.clear() as u64)
    }
}

/// In-memory model for tests of the layers above storage.
#[cfg(test)]
pub(crate) fn memory_model(name: &str) -> Arc<dyn ModelHandle> {
    Arc::new(EngineModel::new(
        name,
        Arc::new(super::engines::MemoryEngine::new()),
        Arc::new(schemapi_core::SystemClock),
    ))
}

#[cfg(test)]
mod tests {
    use schemapi_core::{Condition, ManualClock};
    use serde_json::json;

    use super::*;
    use crate::storage::engines::MemoryEngine;

    fn model() -> EngineModel {
        EngineModel::new(
            "users",
            Arc::new(MemoryEngine::new()),
            Arc::new(ManualClock::new(1_000)),
        )
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_generates_id() {
        let m = model();
        let stored = m.insert(doc(json!({"name": "Alice"}))).await.unwrap();
        let id = document_id(&stored).unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(m.find_by_id(&id).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn insert_keeps_supplied_id_and_rejects_duplicates() {
        let m = model();
        m.insert(doc(json!({"_id": "a1"}))).await.unwrap();
        let err = m.insert(doc(json!({"_id": "a1"}))).await.unwrap_err();
        assert!(err.message.contains("duplicate key"));
        assert_eq!(m.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_of_one_id_admit_exactly_one() {
        let m = Arc::new(model());
        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let m = Arc::clone(&m);
                tokio::spawn(async move { m.insert(doc(json!({"_id": "same", "i": i}))).await })
            })
            .collect();

        let mut admitted = 0;
        for attempt in attempts {
            if attempt.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(m.len(), 1);
    }

    #[tokio::test]
    async fn find_returns_insertion_order() {
        let m = model();
        for name in ["c", "a", "b"] {
            m.insert(doc(json!({"name": name}))).await.unwrap();
        }
        let names: Vec<_> = m
            .find(&Query::new())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d["name"].clone())
            .collect();
        assert_eq!(names, [json!("c"), json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn find_one_and_count_apply_query() {
        let m = model();
        m.insert(doc(json!({"name": "Alice", "age": 30}))).await.unwrap();
        m.insert(doc(json!({"name": "Bob", "age": 30}))).await.unwrap();

        let mut q = Query::new();
        q.push("age", Condition::Equals(json!(30)));
        assert_eq!(m.count(&q).await.unwrap(), 2);
        assert_eq!(m.find_one(&q).await.unwrap().unwrap()["name"], "Alice");

        q.push("name", Condition::Equals(json!("Carol")));
        assert_eq!(m.find_one(&q).await.unwrap(), None);
    }

    #[tokio::test]
    async fn paginate_reports_metadata() {
        let m = model();
        for i in 0..5 {
            m.insert(doc(json!({"i": i}))).await.unwrap();
        }
        let page = m.paginate(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        let items: Vec<_> = page.docs.iter().map(|d| d["i"].clone()).collect();
        assert_eq!(items, [json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn save_replaces_existing_document() {
        let m = model();
        let stored = m.insert(doc(json!({"name": "Alice"}))).await.unwrap();
        let id = document_id(&stored).unwrap();

        let mut changed = stored.clone();
        changed.insert("name".into(), json!("Alicia"));
        m.save(changed).await.unwrap();

        assert_eq!(m.find_by_id(&id).await.unwrap().unwrap()["name"], "Alicia");
        assert_eq!(m.len(), 1);
    }

    #[tokio::test]
    async fn save_unknown_document_fails() {
        let m = model();
        let err = m.save(doc(json!({"_id": "ghost"}))).await.unwrap_err();
        assert!(err.message.contains("ghost"));
        assert!(m.save(doc(json!({"name": "x"}))).await.is_err());
    }

    #[tokio::test]
    async fn remove_reports_whether_document_existed() {
        let m = model();
        m.insert(doc(json!({"_id": "a"}))).await.unwrap();
        assert!(m.remove("a").await.unwrap());
        assert!(!m.remove("a").await.unwrap());
    }

    #[tokio::test]
    async fn remove_all_counts() {
        let m = model();
        m.insert(doc(json!({}))).await.unwrap();
        m.insert(doc(json!({}))).await.unwrap();
        assert_eq!(m.remove_all().await.unwrap(), 2);
        assert!(m.is_empty());
    }
}
