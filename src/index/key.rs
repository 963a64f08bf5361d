//! Orderable index keys, field paths and field extraction.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::{Document, Value};
use crate::error::{CairnError, Result};
use crate::util::id::RecordId;

/// Ordering class of a key. Keys of different classes never compare equal,
/// and range walks stay within a single class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyClass {
    Null,
    Bool,
    Number,
    String,
    DateTime,
}

/// A key in an ordered index map.
///
/// `Null` sorts below every scalar. Numbers compare numerically across
/// integer and float representations, so `1` and `1.0` are the same key.
#[derive(Debug, Clone)]
pub enum OrderableKey {
    Null,
    Scalar(Value),
}

impl OrderableKey {
    /// Build a key from a value. Arrays and documents have no key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(OrderableKey::Null),
            v if v.is_scalar() => Some(OrderableKey::Scalar(v.clone())),
            _ => None,
        }
    }

    pub fn class(&self) -> KeyClass {
        match self {
            OrderableKey::Null => KeyClass::Null,
            OrderableKey::Scalar(v) => value_class(v),
        }
    }

    pub fn value(&self) -> Value {
        match self {
            OrderableKey::Null => Value::Null,
            OrderableKey::Scalar(v) => v.clone(),
        }
    }
}

fn value_class(value: &Value) -> KeyClass {
    match value {
        Value::Bool(_) => KeyClass::Bool,
        Value::Int64(_) | Value::Float64(_) => KeyClass::Number,
        Value::String(_) => KeyClass::String,
        Value::DateTime(_) => KeyClass::DateTime,
        _ => KeyClass::Null,
    }
}

fn compare_floats(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

/// Exact comparison of an integer with a float. Converting the integer to
/// `f64` would round above 2^53 and make distinct integers equal to one float.
fn compare_int_float(int: i64, float: f64) -> Ordering {
    // 2^63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => compare_floats(whole, float),
        unequal => unequal,
    }
}

/// Compare two scalar values of the same class. Returns `None` when the
/// values are not both scalars of one class.
pub fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Int64(x), Value::Int64(y)) => Some(x.cmp(y)),
        (Value::Float64(x), Value::Float64(y)) => Some(compare_floats(*x, *y)),
        (Value::Int64(x), Value::Float64(y)) => Some(compare_int_float(*x, *y)),
        (Value::Float64(x), Value::Int64(y)) => Some(compare_int_float(*y, *x).reverse()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl Ord for OrderableKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (OrderableKey::Null, OrderableKey::Null) => Ordering::Equal,
            (OrderableKey::Null, _) => Ordering::Less,
            (_, OrderableKey::Null) => Ordering::Greater,
            (OrderableKey::Scalar(a), OrderableKey::Scalar(b)) => {
                match value_class(a).cmp(&value_class(b)) {
                    Ordering::Equal => compare_scalars(a, b).unwrap_or(Ordering::Equal),
                    unequal => unequal,
                }
            }
        }
    }
}

impl PartialOrd for OrderableKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OrderableKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderableKey {}

impl fmt::Display for OrderableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderableKey::Null => write!(f, "null"),
            OrderableKey::Scalar(v) => write!(f, "{}", v.to_json()),
        }
    }
}

/// Ordered, non-empty list of field names an index covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(CairnError::validation("field path must name at least one field"));
        }
        if let Some(blank) = fields.iter().find(|f| f.trim().is_empty()) {
            return Err(CairnError::validation(format!(
                "field path contains a blank field name '{blank}'"
            )));
        }
        Ok(FieldPath(fields))
    }

    pub fn single(field: impl Into<String>) -> Self {
        FieldPath(vec![field.into()])
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> &str {
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_compound(&self) -> bool {
        self.0.len() > 1
    }

    /// True when `prefix` names this path's leading fields, in order.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Stable textual form used inside backing-map names.
    pub fn encoded(&self) -> String {
        self.0.join(",")
    }
}

impl From<&str> for FieldPath {
    fn from(field: &str) -> Self {
        FieldPath::single(field)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// The values of an index's fields taken from one record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValues {
    pub id: RecordId,
    pub fields: FieldPath,
    pub values: Vec<(String, Value)>,
}

impl FieldValues {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// Value of the index's first field.
    pub fn first_value(&self) -> &Value {
        self.values.first().map(|(_, v)| v).unwrap_or(&Value::Null)
    }
}

/// Extracts index field values from a record.
pub trait FieldExtractor: Send + Sync + fmt::Debug {
    fn values(&self, document: &Document, fields: &FieldPath) -> Result<FieldValues>;
}

/// Resolves each field as an embedded document path. Missing fields yield `Null`.
#[derive(Debug, Default, Clone)]
pub struct DocumentFieldExtractor;

impl FieldExtractor for DocumentFieldExtractor {
    fn values(&self, document: &Document, fields: &FieldPath) -> Result<FieldValues> {
        let id = document
            .id()?
            .ok_or_else(|| CairnError::validation("document has no record id"))?;
        let values = fields
            .fields()
            .iter()
            .map(|f| (f.clone(), document.get_path(f).unwrap_or(Value::Null)))
            .collect();
        Ok(FieldValues {
            id,
            fields: fields.clone(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: impl Into<Value>) -> OrderableKey {
        OrderableKey::from_value(&v.into()).unwrap()
    }

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![
            key("b"),
            key(2.5),
            OrderableKey::Null,
            key(true),
            key(1),
            key("a"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                OrderableKey::Null,
                key(true),
                key(1),
                key(2.5),
                key("a"),
                key("b")
            ]
        );
    }

    #[test]
    fn test_numeric_keys_compare_across_types() {
        assert_eq!(key(1), key(1.0));
        assert!(key(2) > key(1.5));
        assert_eq!(key(1).class(), KeyClass::Number);
    }

    #[test]
    fn test_large_integers_compare_exactly_with_floats() {
        let big = 1i64 << 53;
        let float = key(big as f64);
        assert_eq!(key(big), float);
        assert!(key(big + 1) > float);
        assert!(key(big) < key(big + 1));
        assert!(key(-big - 1) < key(-big as f64));

        assert!(key(i64::MAX) < key(9_223_372_036_854_775_808.0));
        assert!(key(i64::MIN) == key(-9_223_372_036_854_775_808.0));
        assert!(key(3) > key(2.5) && key(-3) < key(-2.5));
        assert!(key(0) < key(f64::INFINITY) && key(0) > key(f64::NEG_INFINITY));
    }

    #[test]
    fn test_non_scalar_has_no_key() {
        assert!(OrderableKey::from_value(&Value::from(vec![1, 2])).is_none());
        assert!(OrderableKey::from_value(&Value::Document(Document::new())).is_none());
    }

    #[test]
    fn test_field_path_prefix() {
        let ab = FieldPath::new(["a", "b"]).unwrap();
        let a = FieldPath::single("a");
        let b = FieldPath::single("b");
        assert!(ab.starts_with(&a));
        assert!(!ab.starts_with(&b));
        assert!(!a.starts_with(&ab));
        assert!(FieldPath::new(Vec::<String>::new()).is_err());
        assert_eq!(ab.to_string(), "[a, b]");
    }

    #[test]
    fn test_extractor() {
        let mut doc = Document::new()
            .add_field("a", 1)
            .add_field("nested", Document::new().add_field("b", "x"));
        doc.set_id(RecordId::new(7));

        let path = FieldPath::new(["a", "nested.b", "missing"]).unwrap();
        let values = DocumentFieldExtractor.values(&doc, &path).unwrap();
        assert_eq!(values.id, RecordId::new(7));
        assert_eq!(values.first_value(), &Value::Int64(1));
        assert_eq!(values.get("nested.b"), Some(&Value::from("x")));
        assert_eq!(values.get("missing"), Some(&Value::Null));
    }
}
