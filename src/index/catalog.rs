//! Per-collection registry of index metadata.

use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::error::{CairnError, Result};
use crate::index::descriptor::{IndexDescriptor, IndexKind, IndexMeta, meta_map_name};
use crate::index::key::FieldPath;
use crate::store::{KeyValueStore, MapEntries, MetaMap};

/// Maps each indexed field-set of a collection to its [`IndexMeta`].
///
/// The descriptor list is cached and invalidated on every mutation.
#[derive(Debug)]
pub struct IndexCatalog {
    collection: String,
    store: Arc<dyn KeyValueStore>,
    meta_map: MetaMap,
    cache: RwLock<Option<Vec<IndexDescriptor>>>,
}

impl IndexCatalog {
    pub fn open(collection: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let collection = collection.into();
        let meta_map = store.open_meta_map(&meta_map_name(&collection))?;
        Ok(Self {
            collection,
            store,
            meta_map,
            cache: RwLock::new(None),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// True when some index's fields start with `prefix`.
    pub fn has_descriptor(&self, prefix: &FieldPath) -> Result<bool> {
        Ok(!self.matching_descriptors(prefix)?.is_empty())
    }

    pub fn exact_descriptor(&self, fields: &FieldPath) -> Result<Option<IndexDescriptor>> {
        Ok(self.meta(fields)?.map(|meta| meta.descriptor))
    }

    /// All descriptors whose field path starts with `prefix`.
    pub fn matching_descriptors(&self, prefix: &FieldPath) -> Result<Vec<IndexDescriptor>> {
        Ok(self
            .descriptors()?
            .into_iter()
            .filter(|d| d.fields().starts_with(prefix))
            .collect())
    }

    pub fn descriptors(&self) -> Result<Vec<IndexDescriptor>> {
        if let Some(cached) = self.cache.read().as_ref() {
            return Ok(cached.clone());
        }

        let mut descriptors = Vec::new();
        for entry in MapEntries::new(self.meta_map.clone()) {
            let (_, meta) = entry?;
            descriptors.push(meta.descriptor);
        }
        *self.cache.write() = Some(descriptors.clone());
        Ok(descriptors)
    }

    pub fn meta(&self, fields: &FieldPath) -> Result<Option<IndexMeta>> {
        self.meta_map.get(fields)
    }

    pub fn metas(&self) -> Result<Vec<IndexMeta>> {
        MapEntries::new(self.meta_map.clone())
            .map(|entry| entry.map(|(_, meta)| meta))
            .collect()
    }

    pub fn create(&self, fields: FieldPath, kind: IndexKind) -> Result<IndexMeta> {
        if kind == IndexKind::FullText && fields.is_compound() {
            return Err(CairnError::indexing(format!(
                "full-text index is not supported on multiple fields {fields}"
            )));
        }
        if self.meta_map.contains_key(&fields)? {
            return Err(CairnError::indexing(format!(
                "index already exists on fields {fields}"
            )));
        }

        let meta = IndexMeta::new(IndexDescriptor::new(kind, fields.clone(), &self.collection));
        debug!("registering {} in map '{}'", meta.descriptor, meta.map_name);
        self.meta_map.put(fields, meta.clone())?;
        self.invalidate();
        Ok(meta)
    }

    /// Remove the index entry and drop its backing map.
    pub fn remove(&self, fields: &FieldPath) -> Result<IndexMeta> {
        let meta = self.meta(fields)?.ok_or_else(|| {
            CairnError::indexing(format!("{fields} is not indexed"))
        })?;
        self.store.drop_map(&meta.map_name)?;
        self.meta_map.remove(fields)?;
        self.invalidate();
        Ok(meta)
    }

    pub fn is_dirty(&self, fields: &FieldPath) -> Result<bool> {
        Ok(self.meta(fields)?.is_some_and(|meta| meta.dirty))
    }

    pub fn begin_build(&self, fields: &FieldPath) -> Result<()> {
        self.set_dirty(fields, true)
    }

    pub fn end_build(&self, fields: &FieldPath) -> Result<()> {
        self.set_dirty(fields, false)
    }

    fn set_dirty(&self, fields: &FieldPath, dirty: bool) -> Result<()> {
        if let Some(mut meta) = self.meta(fields)? {
            meta.dirty = dirty;
            self.meta_map.put(fields.clone(), meta)?;
        }
        self.invalidate();
        Ok(())
    }

    /// Clear and drop the meta map itself. The catalog is unusable afterwards.
    pub fn drop_meta(&self) -> Result<()> {
        self.meta_map.clear()?;
        self.store.drop_map(self.meta_map.name())?;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        *self.cache.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn catalog() -> (Arc<MemoryStore>, IndexCatalog) {
        let store = Arc::new(MemoryStore::new());
        let catalog = IndexCatalog::open("people", store.clone()).unwrap();
        (store, catalog)
    }

    #[test]
    fn test_create_and_match() {
        let (_, catalog) = catalog();
        let ab = FieldPath::new(["a", "b"]).unwrap();
        catalog.create(ab.clone(), IndexKind::NonUnique).unwrap();
        catalog
            .create(FieldPath::single("c"), IndexKind::Unique)
            .unwrap();

        assert!(catalog.has_descriptor(&FieldPath::single("a")).unwrap());
        assert!(!catalog.has_descriptor(&FieldPath::single("b")).unwrap());
        assert_eq!(
            catalog.matching_descriptors(&FieldPath::single("a")).unwrap()[0].fields(),
            &ab
        );
        assert!(catalog.exact_descriptor(&FieldPath::single("a")).unwrap().is_none());
        assert_eq!(catalog.descriptors().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let (_, catalog) = catalog();
        catalog.create("a".into(), IndexKind::NonUnique).unwrap();
        let err = catalog.create("a".into(), IndexKind::Unique).unwrap_err();
        assert!(matches!(err, CairnError::Indexing(_)));
    }

    #[test]
    fn test_compound_full_text_rejected() {
        let (_, catalog) = catalog();
        let err = catalog
            .create(FieldPath::new(["a", "b"]).unwrap(), IndexKind::FullText)
            .unwrap_err();
        assert!(matches!(err, CairnError::Indexing(_)));
    }

    #[test]
    fn test_dirty_flag_and_cache_invalidation() {
        let (_, catalog) = catalog();
        let a = FieldPath::single("a");
        catalog.create(a.clone(), IndexKind::NonUnique).unwrap();
        assert_eq!(catalog.descriptors().unwrap().len(), 1);

        catalog.begin_build(&a).unwrap();
        assert!(catalog.is_dirty(&a).unwrap());
        catalog.end_build(&a).unwrap();
        assert!(!catalog.is_dirty(&a).unwrap());

        catalog.create("b".into(), IndexKind::NonUnique).unwrap();
        assert_eq!(catalog.descriptors().unwrap().len(), 2);
    }

    #[test]
    fn test_drop_removes_backing_map() {
        let (store, catalog) = catalog();
        let meta = catalog.create("a".into(), IndexKind::NonUnique).unwrap();
        store.open_index_map(&meta.map_name).unwrap();
        assert!(store.has_map(&meta.map_name));

        catalog.remove(&"a".into()).unwrap();
        assert!(!store.has_map(&meta.map_name));
        assert!(catalog.descriptors().unwrap().is_empty());
        assert!(catalog.remove(&"a".into()).is_err());
    }
}
