//! Collection schemas.
//!
//! A schema is parsed from a mongoose-style JSON definition where each field
//! maps either to a type name or to an options object:
//!
//! ```json
//! {
//!   "name": "string",
//!   "age": { "type": "number", "required": true },
//!   "tags": ["string"]
//! }
//! ```
//!
//! Schemas validate documents on write and cast query-string values to the
//! declared field types on read.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::clock::parse_rfc3339_millis;
use crate::query::{Condition, Query};
use crate::types::Document;

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// RFC 3339 string or integer epoch milliseconds.
    Date,
    Array,
    Object,
    /// Accepts any JSON value.
    Mixed,
}

impl FieldType {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "boolean" | "bool" => Some(FieldType::Boolean),
            "date" => Some(FieldType::Date),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            "mixed" | "any" => Some(FieldType::Mixed),
            _ => None,
        }
    }

    /// Returns `true` if `value` is acceptable for this field type.
    /// `null` is accepted by every type; presence is checked separately.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldType::Mixed, _) => true,
            (FieldType::String, Value::String(_))
            | (FieldType::Number, Value::Number(_))
            | (FieldType::Boolean, Value::Bool(_))
            | (FieldType::Array, Value::Array(_))
            | (FieldType::Object, Value::Object(_)) => true,
            (FieldType::Date, Value::String(s)) => parse_rfc3339_millis(s).is_some(),
            (FieldType::Date, Value::Number(n)) => n.is_i64() || n.is_u64(),
            _ => false,
        }
    }

    /// Casts a raw query-string value to this type, or `None` if it does not parse.
    #[must_use]
    pub fn cast_str(self, raw: &str) -> Option<Value> {
        match self {
            FieldType::Number => {
                if let Ok(i) = raw.parse::<i64>() {
                    Some(Value::Number(i.into()))
                } else {
                    raw.parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .map(Value::Number)
                }
            }
            FieldType::Boolean => match raw {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => Some(Value::String(raw.to_string())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

/// Single field definition within a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Name of the field.
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
    /// Whether the field must be present (and non-null) in every document.
    pub required: bool,
}

/// Result of validating a document against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The document conforms to the schema.
    Valid,
    /// The document violates one or more schema constraints.
    Invalid {
        /// Human-readable descriptions of each validation failure.
        errors: Vec<String>,
    },
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Errors produced while parsing a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema `{schema}` must be a JSON object")]
    NotAnObject { schema: String },
    #[error("schema `{schema}` field `{field}` has unknown type `{type_name}`")]
    UnknownType {
        schema: String,
        field: String,
        type_name: String,
    },
    #[error("schema `{schema}` field `{field}` has an unsupported definition")]
    BadField { schema: String, field: String },
}

/// Declared shape of a document collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Collection name; also the URL segment the collection is served under.
    pub name: String,
    /// Field definitions, in declaration order.
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Creates a schema from explicit field definitions.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Parses a mongoose-style definition object.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the definition is not an object, names an
    /// unknown type, or uses an unsupported field shape.
    pub fn from_definition(name: impl Into<String>, definition: &Value) -> Result<Self, SchemaError> {
        let name = name.into();
        let Value::Object(map) = definition else {
            return Err(SchemaError::NotAnObject { schema: name });
        };

        let mut fields = Vec::with_capacity(map.len());
        for (field, def) in map {
            let (field_type, required) = parse_field(&name, field, def)?;
            fields.push(FieldDef {
                name: field.clone(),
                field_type,
                required,
            });
        }
        Ok(Self { name, fields })
    }

    /// Parses every schema in a `{ "<name>": <definition>, ... }` object.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] encountered.
    pub fn parse_set(definitions: &Value) -> Result<Vec<Self>, SchemaError> {
        let Value::Object(map) = definitions else {
            return Err(SchemaError::NotAnObject {
                schema: "<root>".to_string(),
            });
        };
        map.iter()
            .map(|(name, def)| Schema::from_definition(name.clone(), def))
            .collect()
    }

    /// Looks up a field definition by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validates required fields and declared field types.
    /// Fields not declared in the schema are accepted as-is.
    #[must_use]
    pub fn validate(&self, doc: &Document) -> ValidationResult {
        let mut errors = Vec::new();
        for field in &self.fields {
            match doc.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    errors.push(format!("`{}` is required", field.name));
                }
                Some(value) if !field.field_type.accepts(value) => {
                    errors.push(format!("`{}` must be of type {}", field.name, field.field_type));
                }
                _ => {}
            }
        }
        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid { errors }
        }
    }

    /// Builds an exact-match query from raw query-string parameters, casting
    /// each value to its declared field type.
    ///
    /// Values that fail to cast, and fields the schema does not declare, are
    /// kept as strings.
    #[must_use]
    pub fn cast_query(&self, params: &BTreeMap<String, String>) -> Query {
        let mut query = Query::new();
        for (key, raw) in params {
            let value = self
                .field(key)
                .and_then(|f| f.field_type.cast_str(raw))
                .unwrap_or_else(|| Value::String(raw.clone()));
            query.push(key.clone(), Condition::Equals(value));
        }
        query
    }
}

fn parse_field(schema: &str, field: &str, def: &Value) -> Result<(FieldType, bool), SchemaError> {
    let unknown = |type_name: &str| SchemaError::UnknownType {
        schema: schema.to_string(),
        field: field.to_string(),
        type_name: type_name.to_string(),
    };

    match def {
        Value::String(type_name) => FieldType::parse(type_name)
            .map(|t| (t, false))
            .ok_or_else(|| unknown(type_name)),
        Value::Array(_) => Ok((FieldType::Array, false)),
        Value::Object(opts) => match opts.get("type") {
            Some(Value::String(type_name)) => {
                let t = FieldType::parse(type_name).ok_or_else(|| unknown(type_name))?;
                let required = opts.get("required").and_then(Value::as_bool).unwrap_or(false);
                Ok((t, required))
            }
            Some(Value::Array(_)) => {
                let required = opts.get("required").and_then(Value::as_bool).unwrap_or(false);
                Ok((FieldType::Array, required))
            }
            Some(_) => Err(SchemaError::BadField {
                schema: schema.to_string(),
                field: field.to_string(),
            }),
            // A nested object without `type` is a sub-document.
            None => Ok((FieldType::Object, false)),
        },
        _ => Err(SchemaError::BadField {
            schema: schema.to_string(),
            field: field.to_string(),
        }),
    }
}
