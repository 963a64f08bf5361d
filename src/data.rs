//! Documents and the values they hold.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::id::RecordId;

/// Reserved field holding the record id of a document.
pub const ID_FIELD: &str = "_id";

/// Separator for embedded field paths such as `address.city`.
pub const FIELD_SEPARATOR: char = '.';

/// A value stored in a document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    /// Date and time in UTC.
    DateTime(DateTime<Utc>),
    /// List of values (e.g. tags).
    Array(Vec<Value>),
    /// Embedded document.
    Document(Document),
}

impl Value {
    /// Scalars are the values that can be ordered and used as index keys.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int64(_) | Value::Float64(_) | Value::String(_) | Value::DateTime(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Short name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    /// Convert from a JSON value. Integers that fit an `i64` become `Int64`.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int64(i),
                None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut doc = Document::new();
                for (key, value) in map {
                    doc.put(key, Value::from_json(value));
                }
                Value::Document(doc)
            }
        }
    }

    /// Convert to a JSON value. Date-times become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int64(i) => serde_json::Value::from(*i),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Document(doc) => doc.to_json(),
        }
    }
}

// --- Conversions ---

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A schemaless record: named fields holding [`Value`]s.
///
/// The record id lives in the reserved `_id` field as its decimal string.
/// Field names are kept sorted so that two documents with the same content
/// serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Add a field to the document (builder style).
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Insert or replace a top-level field, returning the previous value.
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Get a top-level field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Resolve an embedded path such as `address.city` or `tags.0`.
    ///
    /// A numeric segment indexes into an array. Any other segment applied to an
    /// array collects the field from every element, flattening nested arrays.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        if let Some(value) = self.fields.get(path) {
            return Some(value.clone());
        }
        if !path.contains(FIELD_SEPARATOR) {
            return None;
        }
        let segments: Vec<&str> = path.split(FIELD_SEPARATOR).collect();
        let first = self.fields.get(segments[0])?;
        resolve(first, &segments[1..])
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The record id stored in `_id`, if present.
    pub fn id(&self) -> Result<Option<RecordId>> {
        match self.fields.get(ID_FIELD) {
            Some(Value::String(text)) => RecordId::parse(text).map(Some),
            Some(Value::Int64(i)) if *i >= 0 => Ok(Some(RecordId::new(*i as u64))),
            Some(Value::Null) | None => Ok(None),
            Some(other) => Err(crate::error::CairnError::invalid_id(format!(
                "'{ID_FIELD}' holds a {} value",
                other.type_name()
            ))),
        }
    }

    pub fn set_id(&mut self, id: RecordId) {
        self.fields
            .insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match Value::from_json(json) {
            Value::Document(doc) => doc,
            _ => Document::new(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(Document::from_json(json))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

fn resolve(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Document(doc) => resolve(doc.fields.get(*head)?, rest),
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                return resolve(items.get(index)?, rest);
            }
            let mut collected = Vec::new();
            for item in items {
                match resolve(item, segments) {
                    Some(Value::Array(nested)) => collected.extend(nested),
                    Some(v) => collected.push(v),
                    None => {}
                }
            }
            if collected.is_empty() {
                None
            } else {
                Some(Value::Array(collected))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Document {
        Document::new()
            .add_field("name", "Alice")
            .add_field(
                "address",
                Document::new().add_field("city", "Paris").add_field("zip", 75001),
            )
            .add_field("tags", vec!["a", "b"])
            .add_field(
                "orders",
                vec![
                    Document::new().add_field("sku", "x1"),
                    Document::new().add_field("sku", "x2"),
                ],
            )
    }

    #[test]
    fn test_embedded_path() {
        let doc = person();
        assert_eq!(doc.get_path("address.city"), Some(Value::from("Paris")));
        assert_eq!(doc.get_path("tags.1"), Some(Value::from("b")));
        assert_eq!(
            doc.get_path("orders.sku"),
            Some(Value::from(vec!["x1", "x2"]))
        );
        assert_eq!(doc.get_path("address.country"), None);
        assert_eq!(doc.get_path("name.first"), None);
    }

    #[test]
    fn test_id_field() {
        let mut doc = Document::new();
        assert_eq!(doc.id().unwrap(), None);
        doc.set_id(RecordId::new(42));
        assert_eq!(doc.get(ID_FIELD), Some(&Value::from("42")));
        assert_eq!(doc.id().unwrap(), Some(RecordId::new(42)));

        doc.put(ID_FIELD, "not-a-number");
        assert!(doc.id().is_err());
    }

    #[test]
    fn test_json_conversion() {
        let doc = Document::from_json_str(r#"{"a": 1, "b": 2.5, "c": [true, null], "d": {"e": "x"}}"#)
            .unwrap();
        assert_eq!(doc.get("a"), Some(&Value::Int64(1)));
        assert_eq!(doc.get("b"), Some(&Value::Float64(2.5)));
        assert_eq!(
            doc.get("c"),
            Some(&Value::Array(vec![Value::Bool(true), Value::Null]))
        );
        assert_eq!(doc.get_path("d.e"), Some(Value::from("x")));
        assert_eq!(Document::from_json(doc.to_json()), doc);
    }
}
