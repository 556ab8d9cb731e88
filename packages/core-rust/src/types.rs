use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document: a JSON object with string keys.
///
/// Documents are schema-shaped but not schema-typed. The store owns the
/// identifier field (`_id`) and the creation stamp (`createDate`).
pub type Document = Map<String, Value>;

/// Name of the identifier field carried by every stored document.
pub const ID_FIELD: &str = "_id";

/// Name of the creation timestamp stamped onto documents by `create`.
pub const CREATE_DATE_FIELD: &str = "createDate";

/// Name of the caller-supplied correlation token preserved across a pipeline run.
pub const CORRELATION_FIELD: &str = "uuid";

/// Authenticated caller identity, injected by the outer HTTP/auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier for the authenticated entity.
    pub id: String,
    /// Roles assigned to this principal for authorization checks.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    /// Creates a principal with no roles.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
        }
    }
}

/// Extracts a document's identifier as a string.
///
/// Numeric identifiers are rendered in decimal so that callers can address
/// documents whose `_id` was supplied by a client as a number.
#[must_use]
pub fn document_id(doc: &Document) -> Option<String> {
    match doc.get(ID_FIELD)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn document_id_reads_string() {
        assert_eq!(document_id(&doc(json!({"_id": "abc"}))), Some("abc".into()));
    }

    #[test]
    fn document_id_renders_numbers() {
        assert_eq!(document_id(&doc(json!({"_id": 42}))), Some("42".into()));
    }

    #[test]
    fn document_id_rejects_empty_and_missing() {
        assert_eq!(document_id(&doc(json!({"_id": ""}))), None);
        assert_eq!(document_id(&doc(json!({"name": "x"}))), None);
        assert_eq!(document_id(&doc(json!({"_id": null}))), None);
    }

    #[test]
    fn principal_deserializes_without_roles() {
        let p: Principal = serde_json::from_value(json!({"id": "u1"})).unwrap();
        assert_eq!(p, Principal::new("u1"));
    }
}
