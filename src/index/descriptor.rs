//! Index descriptors and their persisted metadata.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::index::key::FieldPath;

/// Prefix of every index backing map.
pub const INDEX_MAP_PREFIX: &str = "$cairn_index";

/// Prefix of every collection meta map.
pub const META_MAP_PREFIX: &str = "$cairn_meta";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// At most one distinct record per key.
    Unique,
    NonUnique,
    /// Tokenized string index; single field only.
    FullText,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Unique => "unique",
            IndexKind::NonUnique => "non-unique",
            IndexKind::FullText => "full-text",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an index: the collection it belongs to and the ordered fields it covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    kind: IndexKind,
    fields: FieldPath,
    collection: String,
}

impl IndexDescriptor {
    pub fn new(kind: IndexKind, fields: FieldPath, collection: impl Into<String>) -> Self {
        Self {
            kind,
            fields,
            collection: collection.into(),
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn fields(&self) -> &FieldPath {
        &self.fields
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_unique(&self) -> bool {
        self.kind == IndexKind::Unique
    }

    pub fn is_full_text(&self) -> bool {
        self.kind == IndexKind::FullText
    }

    pub fn is_compound(&self) -> bool {
        self.fields.is_compound()
    }
}

impl fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} index on {}{}", self.kind, self.collection, self.fields)
    }
}

/// Descriptor plus the mutable state kept in the collection's meta map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub descriptor: IndexDescriptor,
    pub map_name: String,
    /// Set from registration until a build completes, and again while a
    /// rebuild runs. Left set when a build fails.
    pub dirty: bool,
}

impl IndexMeta {
    pub fn new(descriptor: IndexDescriptor) -> Self {
        let map_name = index_map_name(&descriptor);
        Self {
            descriptor,
            map_name,
            dirty: true,
        }
    }
}

/// Backing-map name for a new index. The trailing generation id keeps a
/// recreated index from ever reusing the map of a dropped one.
pub fn index_map_name(descriptor: &IndexDescriptor) -> String {
    format!(
        "{INDEX_MAP_PREFIX}|{}|{}|{}|{}",
        descriptor.collection(),
        descriptor.fields().encoded(),
        descriptor.kind().as_str(),
        Uuid::new_v4().simple()
    )
}

pub fn meta_map_name(collection: &str) -> String {
    format!("{META_MAP_PREFIX}|{collection}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_names_are_unique_per_creation() {
        let descriptor = IndexDescriptor::new(
            IndexKind::NonUnique,
            FieldPath::new(["a", "b"]).unwrap(),
            "people",
        );
        let first = IndexMeta::new(descriptor.clone());
        let second = IndexMeta::new(descriptor);
        assert!(first.map_name.starts_with("$cairn_index|people|a,b|non-unique|"));
        assert_ne!(first.map_name, second.map_name);
        assert!(first.dirty, "a new index is dirty until built");
    }

    #[test]
    fn test_meta_serializes() {
        let meta = IndexMeta::new(IndexDescriptor::new(
            IndexKind::FullText,
            FieldPath::single("body"),
            "notes",
        ));
        let json = serde_json::to_string(&meta).unwrap();
        let parsed: IndexMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meta);
    }
}
