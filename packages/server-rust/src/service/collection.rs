//! Collection route object: the ten document operations of one schema.
//!
//! Every operation validates its direct parameters, then runs the matching
//! action through the [`Pipeline`]. Actions read their input from the live
//! event, so `before` listeners may rewrite it.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use schemapi_core::{
    document_id, Ack, Action, ClearResult, ClockSource, Document, FilterOptions, FilterResult,
    HookPhase, PageRequest, Payload, Principal, Query, Schema, ValidationResult,
    CORRELATION_FIELD, CREATE_DATE_FIELD,
};
use serde_json::Value;

use super::config::ApiConfig;
use super::event::EventHandle;
use super::hooks::{HookSet, Scope};
use super::operation::OperationError;
use super::pipeline::Pipeline;
use crate::traits::ModelHandle;

/// One registered schema with its model handle, local hooks, and operations.
pub struct Collection {
    schema: Arc<Schema>,
    model: Arc<dyn ModelHandle>,
    hooks: Arc<HookSet>,
    pipeline: Pipeline,
    clock: Arc<dyn ClockSource>,
    config: Arc<ApiConfig>,
}

impl Collection {
    /// Creates a collection whose pipeline wraps its own local hooks in `global`.
    #[must_use]
    pub fn new(
        schema: Schema,
        model: Arc<dyn ModelHandle>,
        global: Arc<HookSet>,
        clock: Arc<dyn ClockSource>,
        config: Arc<ApiConfig>,
    ) -> Self {
        let hooks = Arc::new(HookSet::new(Scope::Local));
        let pipeline = Pipeline::new(
            global,
            Arc::clone(&hooks),
            Arc::clone(&model),
            config.listener_timeout,
        );
        Self {
            schema: Arc::new(schema),
            model,
            hooks,
            pipeline,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn model(&self) -> &Arc<dyn ModelHandle> {
        &self.model
    }

    /// The local hook scope.
    #[must_use]
    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Registers a local `before.<action>` listener.
    pub fn before<F, Fut>(&self, action: Action, listener: F)
    where
        F: Fn(EventHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        self.hooks.on(HookPhase::Before, action, listener);
    }

    /// Registers a local `after.<action>` listener.
    pub fn after<F, Fut>(&self, action: Action, listener: F)
    where
        F: Fn(EventHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        self.hooks.on(HookPhase::After, action, listener);
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Inserts a new document stamped with `createDate`. `None` inserts an
    /// empty document.
    ///
    /// # Errors
    ///
    /// Fails on schema violations and store rejections, plus any pipeline error.
    pub async fn create(
        &self,
        item: Option<Document>,
        user: Option<&Principal>,
    ) -> Result<Payload, OperationError> {
        let input = Payload::Document(item.unwrap_or_default());
        self.pipeline
            .run(self.name(), Action::Create, input, user, |event| async move {
                let mut doc = match event.data() {
                    Payload::Document(doc) => doc,
                    Payload::Empty => Document::new(),
                    _ => return Err(missing(Action::Create, "item")),
                };
                self.strip_correlation(&mut doc);
                doc.insert(
                    CREATE_DATE_FIELD.to_string(),
                    Value::String(self.clock.now_rfc3339()),
                );
                self.validate(&doc)?;

                let stored = self.model.insert(doc).await?;
                event.set_data(stored);
                Ok(())
            })
            .await
    }

    /// Loads one document by identifier.
    ///
    /// # Errors
    ///
    /// `MissingParameter` for an empty id, `NotFound` when no document has it.
    pub async fn get(&self, id: &str, user: Option<&Principal>) -> Result<Payload, OperationError> {
        if id.is_empty() {
            return Err(missing(Action::Get, "id"));
        }
        self.pipeline
            .run(self.name(), Action::Get, Payload::Id(id.to_string()), user, |event| async move {
                let id = event
                    .data()
                    .target_id()
                    .ok_or_else(|| missing(Action::Get, "id"))?;
                let doc = self
                    .model
                    .find_by_id(&id)
                    .await?
                    .ok_or_else(|| self.not_found(&id))?;
                event.set_data(doc);
                Ok(())
            })
            .await
    }

    /// Shallow-merges `item` onto the stored document with the same `_id`.
    ///
    /// # Errors
    ///
    /// `MissingParameter` when the item is absent, empty, or has no `_id`;
    /// `NotFound` when no document has that id; schema and store failures.
    pub async fn update(
        &self,
        item: Option<Document>,
        user: Option<&Principal>,
    ) -> Result<Payload, OperationError> {
        let item = match item {
            Some(item) if !item.is_empty() => item,
            _ => return Err(missing(Action::Update, "item")),
        };
        if document_id(&item).is_none() {
            return Err(missing(Action::Update, "_id"));
        }

        self.pipeline
            .run(self.name(), Action::Update, Payload::Document(item), user, |event| async move {
                let changes = event
                    .data()
                    .into_document()
                    .ok_or_else(|| missing(Action::Update, "item"))?;
                let id = document_id(&changes).ok_or_else(|| missing(Action::Update, "_id"))?;

                let mut doc = self
                    .model
                    .find_by_id(&id)
                    .await?
                    .ok_or_else(|| self.not_found(&id))?;
                doc.extend(changes);
                self.strip_correlation(&mut doc);
                self.validate(&doc)?;

                let saved = self.model.save(doc).await?;
                event.set_data(saved);
                Ok(())
            })
            .await
    }

    /// Removes a document. Succeeds with `{_id, ok: true}` whether or not it existed.
    ///
    /// # Errors
    ///
    /// `MissingParameter` for an empty id; store and pipeline failures.
    pub async fn delete(&self, id: &str, user: Option<&Principal>) -> Result<Payload, OperationError> {
        if id.is_empty() {
            return Err(missing(Action::Delete, "_id"));
        }
        self.pipeline
            .run(self.name(), Action::Delete, Payload::Id(id.to_string()), user, |event| async move {
                let id = event
                    .data()
                    .target_id()
                    .ok_or_else(|| missing(Action::Delete, "_id"))?;
                self.model.remove(&id).await?;
                event.set_data(Payload::Ack(Ack::ok(id)));
                Ok(())
            })
            .await
    }

    /// Removes every document of the collection.
    ///
    /// # Errors
    ///
    /// `ClearDisabled` in production; store and pipeline failures.
    pub async fn clear(&self, user: Option<&Principal>) -> Result<Payload, OperationError> {
        if !self.config.allow_clear() {
            return Err(OperationError::ClearDisabled);
        }
        let input = Payload::Collection(self.name().to_string());
        self.pipeline
            .run(self.name(), Action::Clear, input, user, |event| async move {
                let n = self.model.remove_all().await?;
                tracing::warn!(collection = %self.name(), removed = n, "collection cleared");
                event.set_data(Payload::Cleared(ClearResult {
                    ok: true,
                    n,
                    correlation: None,
                }));
                Ok(())
            })
            .await
    }

    /// Every document, in store order.
    ///
    /// # Errors
    ///
    /// Store and pipeline failures. An empty collection is a success.
    pub async fn get_all(&self, user: Option<&Principal>) -> Result<Payload, OperationError> {
        let input = Payload::Collection(self.name().to_string());
        self.pipeline
            .run(self.name(), Action::GetAll, input, user, |event| async move {
                let docs = self.model.find(&Query::new()).await?;
                event.set_data(Payload::Documents(docs));
                Ok(())
            })
            .await
    }

    /// Documents whose fields equal every field of `query`.
    ///
    /// # Errors
    ///
    /// Store and pipeline failures.
    pub async fn find(
        &self,
        query: Document,
        user: Option<&Principal>,
    ) -> Result<Payload, OperationError> {
        self.pipeline
            .run(self.name(), Action::Find, Payload::Query(query), user, |event| async move {
                let query = self.query_input(&event, Action::Find)?;
                let docs = self.model.find(&query).await?;
                event.set_data(Payload::Documents(docs));
                Ok(())
            })
            .await
    }

    /// [`find`](Self::find) with raw query-string parameters cast to the
    /// declared field types.
    ///
    /// # Errors
    ///
    /// Store and pipeline failures.
    pub async fn find_params(
        &self,
        params: &BTreeMap<String, String>,
        user: Option<&Principal>,
    ) -> Result<Payload, OperationError> {
        let query = match self.schema.cast_query(params).to_json() {
            Value::Object(map) => map,
            _ => Document::new(),
        };
        self.find(query, user).await
    }

    /// Counts and optionally pages the documents matching `options.query`.
    ///
    /// Unless `strict`, string values match as patterns.
    ///
    /// # Errors
    ///
    /// `MissingParameter` when no query is present once the action runs;
    /// store and pipeline failures.
    pub async fn filter(
        &self,
        options: FilterOptions,
        user: Option<&Principal>,
    ) -> Result<Payload, OperationError> {
        self.pipeline
            .run(self.name(), Action::Filter, Payload::Filter(options), user, |event| async move {
                let Payload::Filter(options) = event.data() else {
                    return Err(missing(Action::Filter, "query"));
                };
                let Some(mut raw) = options.query.clone() else {
                    return Err(missing(Action::Filter, "query"));
                };
                raw.remove(CORRELATION_FIELD);

                let mut query = Query::from_document(&raw);
                if !options.strict {
                    query = query.relaxed();
                }

                let count = self.model.count(&query).await?;
                let items = match options.page_request() {
                    Some(page) => self.model.find_page(&query, page).await?,
                    None => self.model.find(&query).await?,
                };
                event.set_data(Payload::Filtered(FilterResult {
                    count,
                    items,
                    correlation: None,
                }));
                Ok(())
            })
            .await
    }

    /// One 1-based page of all documents with pagination metadata.
    ///
    /// # Errors
    ///
    /// `MissingParameter` for a zero length; store and pipeline failures.
    pub async fn pager(
        &self,
        page: u64,
        length: u64,
        user: Option<&Principal>,
    ) -> Result<Payload, OperationError> {
        let input = Payload::Page(PageRequest::new(page, length));
        self.pipeline
            .run(self.name(), Action::Pager, input, user, |event| async move {
                let request = match event.data() {
                    Payload::Page(request) if request.length > 0 => request,
                    _ => return Err(missing(Action::Pager, "length")),
                };
                let page = self.model.paginate(request).await?;
                event.set_data(Payload::Paged(page));
                Ok(())
            })
            .await
    }

    /// First document matching `query`, or [`Payload::Empty`] when none does.
    ///
    /// # Errors
    ///
    /// Store and pipeline failures.
    pub async fn find_one(
        &self,
        query: Document,
        user: Option<&Principal>,
    ) -> Result<Payload, OperationError> {
        self.pipeline
            .run(self.name(), Action::FindOne, Payload::Query(query), user, |event| async move {
                let query = self.query_input(&event, Action::FindOne)?;
                let found = self.model.find_one(&query).await?;
                event.set_data(found.map_or(Payload::Empty, Payload::Document));
                Ok(())
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn not_found(&self, id: &str) -> OperationError {
        OperationError::NotFound {
            collection: self.name().to_string(),
            id: id.to_string(),
        }
    }

    fn validate(&self, doc: &Document) -> Result<(), OperationError> {
        match self.schema.validate(doc) {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid { errors } => Err(OperationError::Validation { errors }),
        }
    }

    /// The correlation token is a client-side tracking value; it is only
    /// stored when the schema declares it.
    fn strip_correlation(&self, doc: &mut Document) {
        if self.schema.field(CORRELATION_FIELD).is_none() {
            doc.remove(CORRELATION_FIELD);
        }
    }

    fn query_input(&self, event: &EventHandle, action: Action) -> Result<Query, OperationError> {
        match event.data() {
            Payload::Query(mut doc) | Payload::Document(mut doc) => {
                doc.remove(CORRELATION_FIELD);
                Ok(Query::from_document(&doc))
            }
            Payload::Empty => Ok(Query::new()),
            _ => Err(missing(action, "query")),
        }
    }
}

fn missing(action: Action, name: &'static str) -> OperationError {
    OperationError::MissingParameter { action, name }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.schema.name)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
