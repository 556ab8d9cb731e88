//! Typed operation payloads.
//!
//! A [`Payload`] is the `data` carried by a pipeline event. Each operation
//! starts with an input variant (`Id`, `Document`, `Query`, ...) and the action
//! replaces it with a result variant (`Document`, `Documents`, `Filtered`, ...).
//! Hook listeners may replace the payload with any variant; the HTTP layer
//! serializes whatever remains at the end of the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::{Page, PageRequest};
use crate::types::{Document, CORRELATION_FIELD};

/// Options for the `filter` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Field query. Required; `filter` fails without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Document>,
    /// When `false`, string fields match as substrings instead of exactly.
    #[serde(default)]
    pub strict: bool,
    /// 1-based page number. Paging applies only when `length` is also set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl FilterOptions {
    /// Creates non-strict, unpaged options for the given query.
    #[must_use]
    pub fn new(query: Document) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }

    /// The page window, if both page and length were supplied and non-zero.
    #[must_use]
    pub fn page_request(&self) -> Option<PageRequest> {
        match (self.page, self.length) {
            (Some(page), Some(length)) if page > 0 && length > 0 => {
                Some(PageRequest::new(page, length))
            }
            _ => None,
        }
    }
}

/// Result of the `filter` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    /// Number of documents matching the query, ignoring paging.
    pub count: u64,
    /// Matching documents, paged when a page window was given.
    pub items: Vec<Document>,
    #[serde(rename = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Value>,
}

/// Acknowledgment returned by `delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "_id")]
    pub id: String,
    pub ok: bool,
    #[serde(rename = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Value>,
}

impl Ack {
    #[must_use]
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            correlation: None,
        }
    }
}

/// Result of `clear`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearResult {
    pub ok: bool,
    /// Number of documents removed.
    pub n: u64,
    #[serde(rename = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Value>,
}

/// Operation payload carried through the hook pipeline.
///
/// Serializes untagged: each variant renders as its content, `Empty` as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// No value; `findOne` with no match.
    Empty,
    /// Input of whole-collection operations (`getAll`, `clear`): the collection name.
    Collection(String),
    /// Identifier input of `get` and `delete`.
    Id(String),
    /// A single document: `create`/`update` input, or a single-document result.
    Document(Document),
    /// A list of documents (`getAll`, `find`).
    Documents(Vec<Document>),
    /// Exact-match query input of `find` and `findOne`.
    Query(Document),
    /// Input of `filter`.
    Filter(FilterOptions),
    /// Input of `pager`.
    Page(PageRequest),
    /// Result of `filter`.
    Filtered(FilterResult),
    /// Result of `pager`.
    Paged(Page),
    /// Result of `delete`.
    Ack(Ack),
    /// Result of `clear`.
    Cleared(ClearResult),
}

impl Payload {
    /// Short variant name, used in error messages and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Collection(_) => "collection",
            Payload::Id(_) => "id",
            Payload::Document(_) => "document",
            Payload::Documents(_) => "documents",
            Payload::Query(_) => "query",
            Payload::Filter(_) => "filter",
            Payload::Page(_) => "page",
            Payload::Filtered(_) => "filtered",
            Payload::Paged(_) => "paged",
            Payload::Ack(_) => "ack",
            Payload::Cleared(_) => "cleared",
        }
    }

    /// The caller-supplied correlation token of a document or query input.
    #[must_use]
    pub fn correlation_token(&self) -> Option<Value> {
        match self {
            Payload::Document(doc) | Payload::Query(doc) => doc
                .get(CORRELATION_FIELD)
                .filter(|v| !v.is_null())
                .cloned(),
            _ => None,
        }
    }

    /// Re-attaches a correlation token, overwriting any existing one.
    ///
    /// Only object-shaped payloads carry a token; lists, scalars and inputs
    /// other than documents are left untouched.
    pub fn attach_correlation(&mut self, token: Value) {
        match self {
            Payload::Document(doc) | Payload::Query(doc) => {
                doc.insert(CORRELATION_FIELD.to_string(), token);
            }
            Payload::Filtered(r) => r.correlation = Some(token),
            Payload::Paged(p) => p.correlation = Some(token),
            Payload::Ack(a) => a.correlation = Some(token),
            Payload::Cleared(c) => c.correlation = Some(token),
            _ => {}
        }
    }

    /// The identifier this payload addresses, from an `Id` or a document's `_id`.
    #[must_use]
    pub fn target_id(&self) -> Option<String> {
        match self {
            Payload::Id(id) if !id.is_empty() => Some(id.clone()),
            Payload::Document(doc) => crate::types::document_id(doc),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Payload::Document(doc) => Some(doc),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_document(self) -> Option<Document> {
        match self {
            Payload::Document(doc) => Some(doc),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_documents(self) -> Option<Vec<Document>> {
        match self {
            Payload::Documents(docs) => Some(docs),
            _ => None,
        }
    }

    /// Serializes the payload into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Document> for Payload {
    fn from(doc: Document) -> Self {
        Payload::Document(doc)
    }
}
