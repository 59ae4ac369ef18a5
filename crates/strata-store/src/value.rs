//! Values at the storage boundary.
//!
//! Stores exchange plain [`serde_json::Value`]s. Tiers that can only persist
//! documents go through [`StoredValue`], which boxes everything that is not a
//! JSON object into a single-field envelope.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// A persisted document: a JSON object.
pub type Document = Map<String, Value>;

/// Field name of the envelope that carries a non-document value.
///
/// Reserved: a caller document whose only field has this name reads back as
/// the bare field value.
pub const PRIMITIVE_FIELD: &str = "__primitive";

/// A value as seen by a document-shaped persistence layer.
#[derive(Clone, Debug, PartialEq)]
pub enum StoredValue {
    /// Anything that is not a JSON object: null, bools, numbers, strings, arrays.
    Primitive(Value),
    /// A JSON object, persisted as-is.
    Document(Document),
}

impl StoredValue {
    /// Classify a caller value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Document(map),
            other => Self::Primitive(other),
        }
    }

    /// Back to a plain value.
    pub fn into_value(self) -> Value {
        match self {
            Self::Primitive(value) => value,
            Self::Document(map) => Value::Object(map),
        }
    }

    /// The document to persist. Primitives are wrapped in the envelope.
    pub fn into_document(self) -> Document {
        match self {
            Self::Primitive(value) => {
                let mut envelope = Map::with_capacity(1);
                envelope.insert(PRIMITIVE_FIELD.to_string(), value);
                envelope
            }
            Self::Document(map) => map,
        }
    }

    /// Interpret a persisted document, unwrapping the envelope if present.
    pub fn from_document(mut doc: Document) -> Self {
        if doc.len() == 1 {
            if let Some(value) = doc.remove(PRIMITIVE_FIELD) {
                return Self::Primitive(value);
            }
        }
        Self::Document(doc)
    }
}

/// Coarse JSON shape, used to detect decode mismatches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Null,
    Bool,
    Number,
    String,
    Array,
    Document,
}

impl Shape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Document,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Document => "document",
        };
        f.write_str(s)
    }
}

/// Check that `stored` can be returned to a caller who passed `default`.
///
/// A `null` default accepts any shape; otherwise the shapes must agree.
pub fn ensure_shape(key: &str, stored: &Value, default: &Value) -> StoreResult<()> {
    let expected = Shape::of(default);
    let found = Shape::of(stored);
    if expected == Shape::Null || expected == found {
        return Ok(());
    }
    Err(StoreError::DecodeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    })
}
