//! Ordered key-value storage consumed by the index and query layers.
//!
//! ## Architecture
//!
//! ```text
//! KeyValueStore (one per database)
//! ├── record maps   RecordId     -> Arc<Document>
//! ├── meta maps     FieldPath    -> IndexMeta
//! ├── index maps    OrderableKey -> IndexNode
//! └── text maps     token        -> Vec<RecordId>
//! ```
//!
//! Every map is named and ordered by key. Individual map operations are
//! atomic; consistency across maps is the caller's concern.

pub mod entries;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use crate::data::Document;
use crate::error::Result;
use crate::index::descriptor::IndexMeta;
use crate::index::key::{FieldPath, OrderableKey};
use crate::index::node::IndexNode;
use crate::util::id::RecordId;

pub use entries::MapEntries;
pub use memory::MemoryStore;

/// A named map ordered by key, with navigation relative to arbitrary keys.
pub trait OrderedMap<K, V>: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn get(&self, key: &K) -> Result<Option<V>>;

    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn put(&self, key: K, value: V) -> Result<()>;

    fn remove(&self, key: &K) -> Result<Option<V>>;

    fn clear(&self) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn first_key(&self) -> Result<Option<K>>;

    fn last_key(&self) -> Result<Option<K>>;

    /// Least key strictly greater than `key`.
    fn higher_key(&self, key: &K) -> Result<Option<K>>;

    /// Least key greater than or equal to `key`.
    fn ceiling_key(&self, key: &K) -> Result<Option<K>>;

    /// Greatest key strictly less than `key`.
    fn lower_key(&self, key: &K) -> Result<Option<K>>;

    /// Greatest key less than or equal to `key`.
    fn floor_key(&self, key: &K) -> Result<Option<K>>;
}

pub type RecordMap = Arc<dyn OrderedMap<RecordId, Arc<Document>>>;
pub type MetaMap = Arc<dyn OrderedMap<FieldPath, IndexMeta>>;
pub type IndexMap = Arc<dyn OrderedMap<OrderableKey, IndexNode>>;
pub type TextMap = Arc<dyn OrderedMap<String, Vec<RecordId>>>;

/// Opens and drops the named maps of a database.
///
/// Opening a map that does not exist creates it. Opening an existing name
/// with a different map type is a storage error.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    fn open_record_map(&self, name: &str) -> Result<RecordMap>;

    fn open_meta_map(&self, name: &str) -> Result<MetaMap>;

    fn open_index_map(&self, name: &str) -> Result<IndexMap>;

    fn open_text_map(&self, name: &str) -> Result<TextMap>;

    fn has_map(&self, name: &str) -> bool;

    /// Remove the map and its content. Handles already open start failing.
    fn drop_map(&self, name: &str) -> Result<()>;
}
