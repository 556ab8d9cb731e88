//! REST routes for registered collections.
//!
//! Each collection `<name>` is served under:
//!
//! - `GET /<name>`: `pager` with `page` and `length`, `getAll` without
//!   parameters, otherwise `find` with the parameters as an exact-match query
//! - `POST /<name>`: `create` with the body
//! - `POST /<name>/filter`: `filter` with the body as query; `page`, `length`
//!   and `strict` from the query string
//! - `GET /<name>/{id}`: `get`
//! - `PUT /<name>/{id}`: `update` with the body and the path id as `_id`
//! - `DELETE /<name>/{id}`: `delete`
//!
//! The caller identity is the [`Principal`] request extension set by an outer
//! layer. Failures answer with the `{success: false, message}` envelope.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use schemapi_core::{Document, FilterOptions, Payload, Principal, ID_FIELD};
use serde_json::Value;
use tracing::warn;

use crate::service::{Api, Collection, OperationError};

type Params = Query<BTreeMap<String, String>>;
type User = Option<Extension<Principal>>;

/// Per-collection handler state.
#[derive(Clone)]
pub struct CollectionRoute {
    collection: Arc<Collection>,
    status_codes: bool,
}

impl CollectionRoute {
    fn respond(&self, result: Result<Payload, OperationError>) -> ApiResponse {
        ApiResponse {
            result,
            status_codes: self.status_codes,
        }
    }
}

/// Outcome of one collection request.
///
/// Errors are logged and rendered as the envelope, with status 200 unless
/// `status_codes` is set.
#[derive(Debug)]
pub struct ApiResponse {
    pub result: Result<Payload, OperationError>,
    pub status_codes: bool,
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        match self.result {
            Ok(payload) => Json(payload).into_response(),
            Err(err) => {
                warn!(error = %err, "operation failed");
                let status = if self.status_codes {
                    StatusCode::from_u16(err.status_code())
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                } else {
                    StatusCode::OK
                };
                (status, Json(err.envelope())).into_response()
            }
        }
    }
}

/// Routes for every collection registered in `api`.
#[must_use]
pub fn collection_routes(api: &Api, status_codes: bool) -> Router {
    api.registry()
        .collections()
        .into_iter()
        .fold(Router::new(), |router, collection| {
            router.merge(collection_router(collection, status_codes))
        })
}

fn collection_router(collection: Arc<Collection>, status_codes: bool) -> Router {
    let base = format!("/{}", collection.name());
    Router::new()
        .route(&base, get(list_handler).post(create_handler))
        .route(&format!("{base}/filter"), post(filter_handler))
        .route(
            &format!("{base}/{{id}}"),
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .with_state(CollectionRoute {
            collection,
            status_codes,
        })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_handler(
    State(route): State<CollectionRoute>,
    user: User,
    Query(params): Params,
) -> ApiResponse {
    let collection = &route.collection;
    let user = principal(&user);

    let result = match (non_empty(&params, "page"), non_empty(&params, "length")) {
        (Some(page), Some(length)) => match (number(page, "page"), number(length, "length")) {
            (Ok(page), Ok(length)) => collection.pager(page, length, user).await,
            (Err(err), _) | (_, Err(err)) => Err(err),
        },
        _ if params.is_empty() => collection.get_all(user).await,
        _ => collection.find_params(&params, user).await,
    };
    route.respond(result)
}

async fn create_handler(
    State(route): State<CollectionRoute>,
    user: User,
    body: Bytes,
) -> ApiResponse {
    let result = match object_body(&body) {
        Ok(item) => route.collection.create(item, principal(&user)).await,
        Err(err) => Err(err),
    };
    route.respond(result)
}

async fn filter_handler(
    State(route): State<CollectionRoute>,
    user: User,
    Query(params): Params,
    body: Bytes,
) -> ApiResponse {
    let options = match filter_options(&params, &body) {
        Ok(options) => options,
        Err(err) => return route.respond(Err(err)),
    };
    let result = route.collection.filter(options, principal(&user)).await;
    route.respond(result)
}

async fn get_handler(
    State(route): State<CollectionRoute>,
    user: User,
    Path(id): Path<String>,
    Query(params): Params,
    body: Bytes,
) -> ApiResponse {
    let id = resolve_id(&id, &params, &body);
    let result = route.collection.get(&id, principal(&user)).await;
    route.respond(result)
}

async fn update_handler(
    State(route): State<CollectionRoute>,
    user: User,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResponse {
    let result = match object_body(&body) {
        Ok(item) => {
            let mut item = item.unwrap_or_default();
            item.insert(ID_FIELD.to_string(), Value::String(id));
            route.collection.update(Some(item), principal(&user)).await
        }
        Err(err) => Err(err),
    };
    route.respond(result)
}

async fn delete_handler(
    State(route): State<CollectionRoute>,
    user: User,
    Path(id): Path<String>,
    Query(params): Params,
    body: Bytes,
) -> ApiResponse {
    let id = resolve_id(&id, &params, &body);
    let result = route.collection.delete(&id, principal(&user)).await;
    route.respond(result)
}

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

fn principal(user: &User) -> Option<&Principal> {
    user.as_ref().map(|Extension(p)| p)
}

fn non_empty<'a>(params: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn number(raw: &str, name: &'static str) -> Result<u64, OperationError> {
    raw.trim()
        .parse()
        .map_err(|_| OperationError::InvalidParameter {
            name,
            value: raw.to_string(),
        })
}

/// Parses an optional JSON object body. An empty body or `null` is `None`.
fn object_body(body: &[u8]) -> Result<Option<Document>, OperationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) => Ok(None),
        Ok(Value::Object(doc)) => Ok(Some(doc)),
        Ok(_) => Err(OperationError::InvalidBody {
            reason: "expected a JSON object".to_string(),
        }),
        Err(err) => Err(OperationError::InvalidBody {
            reason: err.to_string(),
        }),
    }
}

fn filter_options(
    params: &BTreeMap<String, String>,
    body: &[u8],
) -> Result<FilterOptions, OperationError> {
    let page = non_empty(params, "page").map(|v| number(v, "page")).transpose()?;
    let length = non_empty(params, "length")
        .map(|v| number(v, "length"))
        .transpose()?;
    Ok(FilterOptions {
        query: object_body(body)?,
        strict: non_empty(params, "strict").is_some_and(|v| v == "true" || v == "1"),
        page,
        length,
    })
}

/// The request's target id: path segment, else `id` query parameter, else
/// `id` field of a JSON body. Empty when none is present.
fn resolve_id(path: &str, params: &BTreeMap<String, String>, body: &[u8]) -> String {
    if !path.is_empty() {
        return path.to_string();
    }
    if let Some(id) = non_empty(params, "id") {
        return id.to_string();
    }
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| match v.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}
