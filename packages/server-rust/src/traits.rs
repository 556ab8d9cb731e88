use std::sync::Arc;

use async_trait::async_trait;
use schemapi_core::{Document, Page, PageRequest, Query, Schema};

/// Failure reported by a document store. The message is passed through to
/// callers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Storage capability bound to a single collection schema.
///
/// Documents are returned in the store's default order. Implementations:
/// in-memory engine (shipped), external databases (out of tree).
#[async_trait]
pub trait ModelHandle: Send + Sync {
    /// Name of the collection this handle is bound to.
    fn collection(&self) -> &str;

    /// Insert a new document, generating `_id` if absent. Returns the stored document.
    async fn insert(&self, doc: Document) -> Result<Document, StoreError>;

    /// Load a single document by identifier.
    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Load every document matching the query.
    async fn find(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Load the first document matching the query.
    async fn find_one(&self, query: &Query) -> Result<Option<Document>, StoreError>;

    /// Load one page of the documents matching the query.
    async fn find_page(&self, query: &Query, page: PageRequest)
        -> Result<Vec<Document>, StoreError>;

    /// Count the documents matching the query.
    async fn count(&self, query: &Query) -> Result<u64, StoreError>;

    /// Replace an existing document by its `_id`. Returns the persisted document.
    async fn save(&self, doc: Document) -> Result<Document, StoreError>;

    /// Remove a document by identifier. Returns whether a document was removed.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;

    /// Remove every document. Returns the number removed.
    async fn remove_all(&self) -> Result<u64, StoreError>;

    /// One page of all documents with pagination metadata.
    async fn paginate(&self, page: PageRequest) -> Result<Page, StoreError> {
        let all = Query::new();
        let total = self.count(&all).await?;
        let docs = self.find_page(&all, page).await?;
        Ok(Page::new(page, docs, total))
    }
}

/// Pluggable document database. Hands out one [`ModelHandle`] per schema.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Obtain the model handle for a schema, creating the collection if needed.
    async fn model(&self, schema: &Schema) -> anyhow::Result<Arc<dyn ModelHandle>>;

    /// One-time initialization (e.g., connect, run migrations).
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources and close connections.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
