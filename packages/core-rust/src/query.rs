//! Document queries and pagination.
//!
//! A [`Query`] is an ordered list of per-field conditions that must all hold.
//! Exact conditions compare JSON values; pattern conditions run a regular
//! expression over string fields. Array-valued document fields match when any
//! element satisfies the condition.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::Document;

/// A condition on a single document field.
#[derive(Debug, Clone)]
pub enum Condition {
    /// The field equals the value. A `null` value also matches a missing field.
    Equals(Value),
    /// The field is a string matching the pattern.
    Pattern(Regex),
    /// The field is a string containing the literal text.
    Substring(String),
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Condition::Equals(a), Condition::Equals(b)) => a == b,
            (Condition::Pattern(a), Condition::Pattern(b)) => a.as_str() == b.as_str(),
            (Condition::Substring(a), Condition::Substring(b)) => a == b,
            _ => false,
        }
    }
}

impl Condition {
    /// Builds a "contains" pattern from caller input.
    ///
    /// The input is compiled as a regular expression so callers can anchor or
    /// alternate; input that does not compile is matched literally.
    #[must_use]
    pub fn contains(needle: &str) -> Self {
        match Regex::new(needle) {
            Ok(regex) => Condition::Pattern(regex),
            Err(err) => {
                tracing::debug!(pattern = needle, error = %err, "not a valid regex; matching literally");
                Condition::Substring(needle.to_string())
            }
        }
    }

    /// Evaluates the condition against a (possibly missing) field value.
    #[must_use]
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match (self, field) {
            (Condition::Equals(Value::Null), None) => true,
            (_, None) => false,
            (Condition::Equals(expected), Some(actual)) => match actual {
                Value::Array(items) if !expected.is_array() => {
                    items.iter().any(|item| values_equal(item, expected))
                }
                _ => values_equal(actual, expected),
            },
            (Condition::Pattern(regex), Some(actual)) => {
                any_string(actual, |s| regex.is_match(s))
            }
            (Condition::Substring(needle), Some(actual)) => {
                any_string(actual, |s| s.contains(needle.as_str()))
            }
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Condition::Equals(v) => v.clone(),
            Condition::Pattern(r) => json!({ "$regex": r.as_str() }),
            Condition::Substring(s) => json!({ "$regex": regex::escape(s) }),
        }
    }
}

/// Applies a string predicate to a string field, or to each string element of an array field.
fn any_string(value: &Value, pred: impl Fn(&str) -> bool) -> bool {
    match value {
        Value::String(s) => pred(s),
        Value::Array(items) => items.iter().filter_map(Value::as_str).any(pred),
        _ => false,
    }
}

/// JSON equality with numeric comparison across integer/float representations.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// An ordered conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<(String, Condition)>,
}

impl Query {
    /// Creates an empty query, which matches every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an exact-match query from every field of a document.
    #[must_use]
    pub fn from_document(doc: &Document) -> Self {
        Self {
            conditions: doc
                .iter()
                .map(|(k, v)| (k.clone(), Condition::Equals(v.clone())))
                .collect(),
        }
    }

    /// Appends a condition, replacing any existing condition on the same field.
    pub fn push(&mut self, field: impl Into<String>, condition: Condition) {
        let field = field.into();
        if let Some(slot) = self.conditions.iter_mut().find(|(f, _)| *f == field) {
            slot.1 = condition;
        } else {
            self.conditions.push((field, condition));
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, c)| c)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(f, c)| (f.as_str(), c))
    }

    /// Rewrites every string equality into a "contains" pattern.
    #[must_use]
    pub fn relaxed(self) -> Self {
        Self {
            conditions: self
                .conditions
                .into_iter()
                .map(|(field, cond)| match cond {
                    Condition::Equals(Value::String(s)) => (field, Condition::contains(&s)),
                    other => (field, other),
                })
                .collect(),
        }
    }

    /// Returns `true` if every condition holds for the document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, cond)| cond.matches(doc.get(field)))
    }

    /// Renders the query as JSON; patterns appear as `{"$regex": "..."}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .conditions
            .iter()
            .map(|(f, c)| (f.clone(), c.to_json()))
            .collect();
        Value::Object(map)
    }
}

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1. Page 0 is treated as page 1.
    pub page: u64,
    /// Page length. Must be non-zero.
    pub length: u64,
}

impl PageRequest {
    #[must_use]
    pub fn new(page: u64, length: u64) -> Self {
        Self { page, length }
    }

    /// Number of documents to skip before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.page.max(1).saturating_sub(1).saturating_mul(self.length)
    }

    /// Number of pages needed to hold `total` documents.
    #[must_use]
    pub fn page_count(&self, total: u64) -> u64 {
        if self.length == 0 {
            0
        } else {
            total.div_ceil(self.length)
        }
    }

    /// Returns the slice of `items` that falls on this page.
    #[must_use]
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let length = usize::try_from(self.length).unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(length).collect()
    }
}

/// One page of documents with pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Documents on this page, in store order.
    pub docs: Vec<Document>,
    /// Total number of documents across all pages.
    pub total: u64,
    /// Page length that was requested.
    pub limit: u64,
    /// 1-based page number that was returned.
    pub page: u64,
    /// Total number of pages.
    pub pages: u64,
    #[serde(rename = "uuid", default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Value>,
}

impl Page {
    /// Assembles a page from the requested window, the documents on it, and the total.
    #[must_use]
    pub fn new(request: PageRequest, docs: Vec<Document>, total: u64) -> Self {
        Self {
            docs,
            total,
            limit: request.length,
            page: request.page.max(1),
            pages: request.page_count(total),
            correlation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(Query::new().matches(&doc(json!({"a": 1}))));
    }

    #[test]
    fn exact_query_requires_every_field() {
        let q = Query::from_document(&doc(json!({"name": "Alice", "age": 30})));
        assert!(q.matches(&doc(json!({"name": "Alice", "age": 30, "x": 1}))));
        assert!(!q.matches(&doc(json!({"name": "Alice", "age": 31}))));
        assert!(!q.matches(&doc(json!({"name": "Alice"}))));
    }

    #[test]
    fn numbers_compare_across_representations() {
        let q = Query::from_document(&doc(json!({"n": 3})));
        assert!(q.matches(&doc(json!({"n": 3.0}))));
    }

    #[test]
    fn null_matches_missing_field() {
        let q = Query::from_document(&doc(json!({"deleted": null})));
        assert!(q.matches(&doc(json!({"name": "a"}))));
        assert!(!q.matches(&doc(json!({"deleted": true}))));
    }

    #[test]
    fn scalar_equality_matches_array_elements() {
        let q = Query::from_document(&doc(json!({"tags": "red"})));
        assert!(q.matches(&doc(json!({"tags": ["blue", "red"]}))));
        assert!(!q.matches(&doc(json!({"tags": ["blue"]}))));
    }

    #[test]
    fn relaxed_query_matches_substrings() {
        let q = Query::from_document(&doc(json!({"name": "Al"}))).relaxed();
        assert!(q.matches(&doc(json!({"name": "Alice"}))));
        assert!(q.matches(&doc(json!({"name": "Albert"}))));
        assert!(q.matches(&doc(json!({"name": "Sally Al"}))));
        assert!(!q.matches(&doc(json!({"name": "Bob"}))));
        // Case-sensitive, like the pattern it compiles to.
        assert!(!q.matches(&doc(json!({"name": "Hal"}))));
    }

    #[test]
    fn relaxed_query_keeps_non_string_equalities() {
        let q = Query::from_document(&doc(json!({"age": 30}))).relaxed();
        assert_eq!(q.get("age"), Some(&Condition::Equals(json!(30))));
    }

    #[test]
    fn invalid_pattern_is_matched_literally() {
        let q = Query::from_document(&doc(json!({"expr": "a(b"}))).relaxed();
        assert!(q.matches(&doc(json!({"expr": "xa(by"}))));
        assert!(!q.matches(&doc(json!({"expr": "ab"}))));
    }

    #[test]
    fn pattern_does_not_match_numbers() {
        let q = Query::from_document(&doc(json!({"n": "1"}))).relaxed();
        assert!(!q.matches(&doc(json!({"n": 1}))));
    }

    #[test]
    fn push_replaces_existing_field() {
        let mut q = Query::new();
        q.push("a", Condition::Equals(json!(1)));
        q.push("a", Condition::Equals(json!(2)));
        assert_eq!(q.len(), 1);
        assert_eq!(q.get("a"), Some(&Condition::Equals(json!(2))));
    }

    #[test]
    fn to_json_renders_patterns() {
        let q = Query::from_document(&doc(json!({"name": "Al", "age": 3}))).relaxed();
        assert_eq!(q.to_json(), json!({"name": {"$regex": "Al"}, "age": 3}));
    }

    #[test]
    fn page_offsets_are_one_based() {
        assert_eq!(PageRequest::new(1, 10).offset(), 0);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
        assert_eq!(PageRequest::new(0, 10).offset(), 0);
    }

    #[test]
    fn page_metadata() {
        let page = Page::new(PageRequest::new(2, 2), vec![doc(json!({"a": 1}))], 3);
        assert_eq!(page.pages, 2);
        assert_eq!(page.limit, 2);
        assert_eq!(page.page, 2);
        assert_eq!(page.total, 3);
        let json = serde_json::to_value(&page).unwrap();
        assert!(json.get("uuid").is_none());
    }

    proptest! {
        #[test]
        fn pages_cover_every_item_exactly_once(total in 0usize..200, length in 1u64..20) {
            let items: Vec<usize> = (0..total).collect();
            let request = PageRequest::new(1, length);
            let pages = request.page_count(total as u64);
            let mut seen = Vec::new();
            for page in 1..=pages {
                seen.extend(PageRequest::new(page, length).slice(items.clone()));
            }
            prop_assert_eq!(seen, items);
        }
    }
}
