//! Secondary indexes.
//!
//! ## Architecture
//!
//! ```text
//! IndexOperations (lifecycle, document writes)
//! ├── IndexCatalog      field-set -> IndexMeta (descriptor, map name, dirty)
//! ├── BuildCoordinator  field-set -> Idle | Building
//! └── IndexStore        one per descriptor, cached by map name
//!     ├── SingleFieldIndex  key -> Terminal(ids)
//!     ├── CompoundIndex     key -> Inner(key -> ... -> Terminal(ids))
//!     └── TextIndex         token -> ids
//! ```

pub mod build;
pub mod catalog;
pub mod compound;
pub mod descriptor;
pub mod key;
pub mod node;
pub mod operations;
pub mod scanner;
pub mod single;
pub mod text;
pub mod tokenizer;

use std::fmt;

use crate::data::Value;
use crate::error::{CairnError, Result};
use crate::query::plan::FindPlan;

use self::descriptor::IndexDescriptor;
use self::key::{FieldValues, OrderableKey};
use self::node::RecordIdSet;

/// Storage of one index.
pub trait IndexStore: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &IndexDescriptor;

    /// Add the record's entries. A rejected write leaves the index unchanged.
    fn write(&self, values: &FieldValues) -> Result<()>;

    fn remove(&self, values: &FieldValues) -> Result<()>;

    /// Remove every entry, keeping the index usable.
    fn clear(&self) -> Result<()>;

    /// Drop the backing map.
    fn drop_index(&self) -> Result<()>;

    /// Ids selected by the plan's scan spec, duplicate-free in walk order.
    fn scan(&self, plan: &FindPlan) -> Result<RecordIdSet>;
}

/// Keys for the first index field, which may hold several values.
///
/// Arrays fan out into one key per distinct element; an empty array yields
/// no key. Documents and nested arrays are rejected.
pub(crate) fn multi_value_keys(field: &str, value: &Value) -> Result<Vec<OrderableKey>> {
    match value {
        Value::Array(items) => {
            let mut keys: Vec<OrderableKey> = Vec::with_capacity(items.len());
            for item in items {
                if matches!(item, Value::Array(_)) {
                    return Err(CairnError::indexing(format!(
                        "nested array in field '{field}' is not supported for indexing"
                    )));
                }
                let key = single_value_key(field, item)?;
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            Ok(keys)
        }
        other => Ok(vec![single_value_key(field, other)?]),
    }
}

/// Key for a field that must hold a single comparable value (or nothing).
pub(crate) fn single_value_key(field: &str, value: &Value) -> Result<OrderableKey> {
    OrderableKey::from_value(value).ok_or_else(|| {
        CairnError::indexing(format!(
            "{} value of field '{field}' cannot be indexed",
            value.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_value_keys() {
        let keys = multi_value_keys("tags", &Value::from(vec!["a", "b", "a"])).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(multi_value_keys("tags", &Value::Array(vec![])).unwrap().is_empty());
        assert_eq!(
            multi_value_keys("tags", &Value::Null).unwrap(),
            vec![OrderableKey::Null]
        );

        let nested = Value::Array(vec![Value::from(vec![1, 2])]);
        assert!(matches!(
            multi_value_keys("tags", &nested),
            Err(CairnError::Indexing(_))
        ));
        let document = Value::Document(crate::data::Document::new());
        assert!(multi_value_keys("tags", &document).is_err());
    }
}
