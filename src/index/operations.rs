//! Index lifecycle and document index maintenance for one collection.

use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::config::CollectionConfig;
use crate::data::Document;
use crate::error::{CairnError, Result};
use crate::event::{EventBus, IndexEvent};
use crate::index::IndexStore;
use crate::index::build::{BuildCoordinator, BuildGuard};
use crate::index::catalog::IndexCatalog;
use crate::index::compound::CompoundIndex;
use crate::index::descriptor::{IndexDescriptor, IndexKind, IndexMeta};
use crate::index::key::{FieldExtractor, FieldPath};
use crate::index::single::SingleFieldIndex;
use crate::index::text::TextIndex;
use crate::index::tokenizer::TextTokenizer;
use crate::query::plan::FindPlan;
use crate::store::{KeyValueStore, MapEntries, RecordMap};

/// Owns the catalog, the build flags and the index store handles of a collection.
#[derive(Debug)]
pub struct IndexOperations {
    collection: String,
    store: Arc<dyn KeyValueStore>,
    records: RecordMap,
    catalog: RwLock<Arc<IndexCatalog>>,
    coordinator: Arc<BuildCoordinator>,
    index_stores: RwLock<AHashMap<String, Arc<dyn IndexStore>>>,
    extractor: Arc<dyn FieldExtractor>,
    tokenizer: Arc<dyn TextTokenizer>,
    events: Arc<EventBus>,
    rebuild_dirty_on_write: bool,
    parallel_index_drop: bool,
}

impl IndexOperations {
    pub fn new(
        collection: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        records: RecordMap,
        config: &CollectionConfig,
        coordinator: Arc<BuildCoordinator>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let collection = collection.into();
        let catalog = IndexCatalog::open(collection.clone(), store.clone())?;
        Ok(Self {
            collection,
            store,
            records,
            catalog: RwLock::new(Arc::new(catalog)),
            coordinator,
            index_stores: RwLock::new(AHashMap::new()),
            extractor: config.field_extractor(),
            tokenizer: config.tokenizer(),
            events,
            rebuild_dirty_on_write: config.rebuild_dirty_on_write,
            parallel_index_drop: config.parallel_index_drop,
        })
    }

    fn catalog(&self) -> Arc<IndexCatalog> {
        self.catalog.read().clone()
    }

    /// Register an index and build it over the existing records.
    ///
    /// The build flag is taken before the index is registered, and the index
    /// starts out dirty, so no query trusts it until the first build ends.
    pub fn create_index(&self, fields: FieldPath, kind: IndexKind) -> Result<IndexDescriptor> {
        let guard = self
            .coordinator
            .try_begin(&fields)
            .ok_or_else(|| already_running(&fields))?;
        let meta = self.catalog().create(fields, kind)?;
        info!("created {}", meta.descriptor);
        self.build_with(guard, &meta.descriptor, false)?;
        Ok(meta.descriptor)
    }

    /// Build (or rebuild) an index from every record of the collection.
    ///
    /// Fails with an indexing error when a build is already running for the
    /// same fields. The index stays dirty if the build fails.
    pub fn build_index(&self, descriptor: &IndexDescriptor, rebuild: bool) -> Result<()> {
        if self.try_build(descriptor, rebuild)? {
            Ok(())
        } else {
            Err(already_running(descriptor.fields()))
        }
    }

    /// Like [`build_index`](Self::build_index), but returns `Ok(false)`
    /// instead of failing when another build holds the flag.
    fn try_build(&self, descriptor: &IndexDescriptor, rebuild: bool) -> Result<bool> {
        let Some(guard) = self.coordinator.try_begin(descriptor.fields()) else {
            return Ok(false);
        };
        self.build_with(guard, descriptor, rebuild)?;
        Ok(true)
    }

    fn build_with(&self, guard: BuildGuard, descriptor: &IndexDescriptor, rebuild: bool) -> Result<()> {
        let fields = descriptor.fields();
        self.events.publish(&IndexEvent::BuildStart(fields.clone()));
        let result = self.run_build(descriptor, rebuild);
        drop(guard);
        self.events.publish(&IndexEvent::BuildEnd(fields.clone()));

        if let Err(e) = &result {
            warn!("building {descriptor} failed, index left dirty: {e}");
        }
        result
    }

    fn run_build(&self, descriptor: &IndexDescriptor, rebuild: bool) -> Result<()> {
        let catalog = self.catalog();
        let fields = descriptor.fields();
        catalog.begin_build(fields)?;

        let index = self.index_store(descriptor)?;
        if rebuild {
            index.clear()?;
        }

        let mut count = 0usize;
        for entry in MapEntries::new(self.records.clone()) {
            let (_, document) = entry?;
            let values = self.extractor.values(&document, fields)?;
            index.write(&values)?;
            count += 1;
        }

        catalog.end_build(fields)?;
        debug!("indexed {count} records into {descriptor}");
        Ok(())
    }

    pub fn rebuild_index(&self, fields: &FieldPath) -> Result<()> {
        let descriptor = self
            .catalog()
            .exact_descriptor(fields)?
            .ok_or_else(|| CairnError::indexing(format!("{fields} is not indexed")))?;
        info!("rebuilding {descriptor}");
        self.build_index(&descriptor, true)
    }

    pub fn drop_index(&self, fields: &FieldPath) -> Result<()> {
        if self.coordinator.is_building(fields) {
            return Err(CairnError::indexing(format!(
                "cannot drop index on {fields} while indexing is running"
            )));
        }
        let meta = self.catalog().remove(fields)?;
        self.index_stores.write().remove(&meta.map_name);
        self.coordinator.remove(fields);
        info!("dropped {}", meta.descriptor);
        Ok(())
    }

    /// Drop every index of the collection and start over with a fresh catalog.
    pub fn drop_all_indices(&self) -> Result<()> {
        if self.coordinator.any_building() {
            return Err(CairnError::indexing(
                "cannot drop indexes while indexing is running",
            ));
        }

        let catalog = self.catalog();
        let metas = catalog.metas()?;
        let stores = metas
            .iter()
            .map(|meta| self.store_for_meta(meta))
            .collect::<Result<Vec<_>>>()?;

        if self.parallel_index_drop {
            stores.par_iter().try_for_each(|index| index.drop_index())?;
        } else {
            for index in &stores {
                index.drop_index()?;
            }
        }

        self.index_stores.write().clear();
        self.coordinator.clear();
        catalog.drop_meta()?;
        *self.catalog.write() = Arc::new(IndexCatalog::open(
            self.collection.clone(),
            self.store.clone(),
        )?);
        info!("dropped {} indexes of '{}'", metas.len(), self.collection);
        Ok(())
    }

    pub fn has_index(&self, fields: &FieldPath) -> Result<bool> {
        self.catalog().has_descriptor(fields)
    }

    pub fn is_indexing(&self, fields: &FieldPath) -> Result<bool> {
        Ok(self.has_index(fields)? && self.coordinator.is_building(fields))
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        self.catalog().descriptors()
    }

    pub fn find_index(&self, fields: &FieldPath) -> Result<Option<IndexDescriptor>> {
        self.catalog().exact_descriptor(fields)
    }

    /// Dirty and no build running.
    pub fn should_rebuild_index(&self, fields: &FieldPath) -> Result<bool> {
        Ok(self.catalog().is_dirty(fields)? && !self.coordinator.is_building(fields))
    }

    /// Plan a query over the indexes a scan may trust.
    ///
    /// Indexes being built are never offered to `optimize`. Dirty idle ones
    /// are, and get rebuilt only when the chosen plan scans them; a rebuild
    /// error fails the query, a lost race drops the index and plans again.
    pub fn plan<F>(&self, optimize: F) -> Result<FindPlan>
    where
        F: Fn(&[IndexDescriptor]) -> Result<FindPlan>,
    {
        let catalog = self.catalog();
        let mut candidates: Vec<IndexDescriptor> = catalog
            .descriptors()?
            .into_iter()
            .filter(|d| !self.coordinator.is_building(d.fields()))
            .collect();

        loop {
            let plan = optimize(&candidates)?;
            let mut excluded = Vec::new();
            for descriptor in plan.index_descriptors() {
                let fields = descriptor.fields();
                let usable = if self.coordinator.is_building(fields) {
                    false
                } else if catalog.is_dirty(fields)? {
                    self.try_build(descriptor, true)?
                } else {
                    true
                };
                if !usable {
                    debug!("skipping {descriptor} while it is being built");
                    excluded.push(fields.clone());
                }
            }
            if excluded.is_empty() {
                return Ok(plan);
            }
            candidates.retain(|d| !excluded.contains(d.fields()));
        }
    }

    pub fn index_store(&self, descriptor: &IndexDescriptor) -> Result<Arc<dyn IndexStore>> {
        let meta = self
            .catalog()
            .meta(descriptor.fields())?
            .ok_or_else(|| CairnError::indexing(format!("{} is not indexed", descriptor.fields())))?;
        self.store_for_meta(&meta)
    }

    fn store_for_meta(&self, meta: &IndexMeta) -> Result<Arc<dyn IndexStore>> {
        if let Some(index) = self.index_stores.read().get(&meta.map_name) {
            return Ok(index.clone());
        }

        let descriptor = meta.descriptor.clone();
        let map_name = meta.map_name.clone();
        let index: Arc<dyn IndexStore> = match descriptor.kind() {
            IndexKind::FullText => Arc::new(TextIndex::new(
                descriptor,
                map_name,
                self.store.clone(),
                self.tokenizer.clone(),
            )?),
            _ if descriptor.is_compound() => {
                Arc::new(CompoundIndex::new(descriptor, map_name, self.store.clone())?)
            }
            _ => Arc::new(SingleFieldIndex::new(descriptor, map_name, self.store.clone())?),
        };
        Ok(self
            .index_stores
            .write()
            .entry(meta.map_name.clone())
            .or_insert(index)
            .clone())
    }

    /// Add a stored document to every index. If one index rejects it, the
    /// entries already written to the others are removed again.
    ///
    /// An index being built takes the entry directly, as the build may have
    /// walked past the record already. A dirty idle index is rebuilt from the
    /// record map when `rebuild_dirty_on_write` is set, and skipped otherwise.
    pub fn write_index_entry(&self, document: &Document) -> Result<()> {
        let mut written: Vec<(Arc<dyn IndexStore>, FieldPath)> = Vec::new();

        for descriptor in self.catalog().descriptors()? {
            let fields = descriptor.fields();
            let result = if self.should_rebuild_index(fields)? {
                // the record is already stored, so a rebuild picks it up
                self.rebuild_for_write(&descriptor).and_then(|rebuilt| {
                    if !rebuilt {
                        self.write_entry(&descriptor, document, &mut written)
                    } else if self.rebuild_dirty_on_write {
                        let index = self.index_store(&descriptor)?;
                        written.push((index, fields.clone()));
                        Ok(())
                    } else {
                        Ok(())
                    }
                })
            } else {
                self.write_entry(&descriptor, document, &mut written)
            };

            if let Err(e) = result {
                self.rollback(document, &written);
                return Err(e);
            }
        }
        Ok(())
    }

    fn write_entry(
        &self,
        descriptor: &IndexDescriptor,
        document: &Document,
        written: &mut Vec<(Arc<dyn IndexStore>, FieldPath)>,
    ) -> Result<()> {
        let index = self.index_store(descriptor)?;
        let values = self.extractor.values(document, descriptor.fields())?;
        index.write(&values)?;
        written.push((index, descriptor.fields().clone()));
        Ok(())
    }

    /// Rebuild a dirty idle index ahead of a document write. Returns false
    /// when the write has to go to the index itself: another build took the
    /// flag first. Returns true when the index needs nothing more: it was
    /// rebuilt, or it is left dirty because `rebuild_dirty_on_write` is off.
    fn rebuild_for_write(&self, descriptor: &IndexDescriptor) -> Result<bool> {
        if !self.rebuild_dirty_on_write {
            return Ok(true);
        }
        self.try_build(descriptor, true)
    }

    fn rollback(&self, document: &Document, written: &[(Arc<dyn IndexStore>, FieldPath)]) {
        for (index, fields) in written {
            let undo = self
                .extractor
                .values(document, fields)
                .and_then(|values| index.remove(&values));
            if let Err(e) = undo {
                warn!("failed to roll back index entry on {fields}: {e}");
            }
        }
    }

    /// Remove a document's entries from every index. The record map must no
    /// longer hold this version of the document, so that a rebuild cannot
    /// index it again. Dirty idle indexes follow the same rule as in
    /// [`write_index_entry`](Self::write_index_entry).
    pub fn remove_index_entry(&self, document: &Document) -> Result<()> {
        for descriptor in self.catalog().descriptors()? {
            let fields = descriptor.fields();
            if self.should_rebuild_index(fields)? && self.rebuild_for_write(&descriptor)? {
                continue;
            }
            let values = self.extractor.values(document, fields)?;
            self.index_store(&descriptor)?.remove(&values)?;
        }
        Ok(())
    }

    /// Replace `old`'s entries by `new`'s. When the new entries are rejected
    /// the old ones are restored.
    pub fn update_index_entry(&self, old: &Document, new: &Document) -> Result<()> {
        self.remove_index_entry(old)?;
        if let Err(e) = self.write_index_entry(new) {
            if let Err(restore) = self.write_index_entry(old) {
                warn!("failed to restore index entries after rejected update: {restore}");
            }
            return Err(e);
        }
        Ok(())
    }
}

fn already_running(fields: &FieldPath) -> CairnError {
    CairnError::indexing(format!("indexing is already running on {fields}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::query::filter::field;
    use crate::query::plan::{FindPlan, IndexScanSpec};
    use crate::store::MemoryStore;
    use crate::util::id::RecordId;

    fn setup() -> (Arc<MemoryStore>, RecordMap, IndexOperations) {
        let store = Arc::new(MemoryStore::new());
        let records = store.open_record_map("people").unwrap();
        let ops = IndexOperations::new(
            "people",
            store.clone(),
            records.clone(),
            &CollectionConfig::default(),
            Arc::new(BuildCoordinator::new()),
            Arc::new(EventBus::new()),
        )
        .unwrap();
        (store, records, ops)
    }

    fn put(records: &RecordMap, id: u64, name: &str) -> Document {
        let mut doc = Document::new().add_field("name", name);
        doc.set_id(RecordId::new(id));
        records.put(RecordId::new(id), Arc::new(doc.clone())).unwrap();
        doc
    }

    fn scan_eq(ops: &IndexOperations, value: impl Into<Value>) -> Vec<u64> {
        let descriptor = ops.find_index(&"name".into()).unwrap().unwrap();
        let plan = FindPlan {
            index_scan_spec: Some(IndexScanSpec::new(vec![
                field("name").eq(value).comparison().unwrap().clone(),
            ])),
            ..FindPlan::default()
        };
        ops.index_store(&descriptor)
            .unwrap()
            .scan(&plan)
            .unwrap()
            .into_iter()
            .map(|id| id.value())
            .collect()
    }

    #[test]
    fn test_create_builds_existing_records() {
        let (_, records, ops) = setup();
        put(&records, 1, "alice");
        put(&records, 2, "bob");

        ops.create_index("name".into(), IndexKind::NonUnique).unwrap();
        assert_eq!(scan_eq(&ops, "bob"), vec![2]);
        assert!(!ops.should_rebuild_index(&"name".into()).unwrap());
    }

    #[test]
    fn test_failed_build_stays_dirty() {
        let (_, records, ops) = setup();
        put(&records, 1, "alice");
        put(&records, 2, "alice");

        let err = ops
            .create_index("name".into(), IndexKind::Unique)
            .unwrap_err();
        assert!(matches!(err, CairnError::UniqueConstraint(_)));
        assert!(ops.has_index(&"name".into()).unwrap());
        assert!(ops.should_rebuild_index(&"name".into()).unwrap());
        assert!(!ops.is_indexing(&"name".into()).unwrap());
    }

    #[test]
    fn test_write_rolls_back_on_rejection() {
        let (_, records, ops) = setup();
        ops.create_index("name".into(), IndexKind::NonUnique).unwrap();
        ops.create_index("tag".into(), IndexKind::Unique).unwrap();

        let mut first = put(&records, 1, "alice");
        first.put("tag", "x");
        ops.write_index_entry(&first).unwrap();

        // "name" is written before "tag" rejects the duplicate
        let mut second = put(&records, 2, "bob");
        second.put("tag", "x");
        let err = ops.write_index_entry(&second).unwrap_err();
        assert!(matches!(err, CairnError::UniqueConstraint(_)));
        assert!(scan_eq(&ops, "bob").is_empty());
        assert_eq!(scan_eq(&ops, "alice"), vec![1]);
    }

    #[test]
    fn test_drop_twice_fails() {
        let (store, _, ops) = setup();
        let descriptor = ops.create_index("name".into(), IndexKind::NonUnique).unwrap();
        let map_count = store.map_names().len();

        ops.drop_index(descriptor.fields()).unwrap();
        assert_eq!(store.map_names().len(), map_count - 1);
        let err = ops.drop_index(descriptor.fields()).unwrap_err();
        assert!(matches!(err, CairnError::Indexing(_)));
    }

    #[test]
    fn test_drop_all_recreates_catalog() {
        let (store, records, ops) = setup();
        put(&records, 1, "alice");
        ops.create_index("name".into(), IndexKind::NonUnique).unwrap();
        ops.create_index(FieldPath::new(["name", "age"]).unwrap(), IndexKind::NonUnique)
            .unwrap();

        ops.drop_all_indices().unwrap();
        assert!(ops.list_indexes().unwrap().is_empty());
        assert!(
            store
                .map_names()
                .iter()
                .all(|name| !name.starts_with(crate::index::descriptor::INDEX_MAP_PREFIX))
        );

        ops.create_index("name".into(), IndexKind::NonUnique).unwrap();
        assert_eq!(scan_eq(&ops, "alice"), vec![1]);
    }

    #[test]
    fn test_rebuild_matches_fresh_build() {
        let (_, records, ops) = setup();
        for (id, name) in [(1, "a"), (2, "b"), (3, "a")] {
            put(&records, id, name);
        }
        ops.create_index("name".into(), IndexKind::NonUnique).unwrap();
        let fresh = scan_eq(&ops, "a");

        ops.rebuild_index(&"name".into()).unwrap();
        assert_eq!(scan_eq(&ops, "a"), fresh);
        assert!(ops.rebuild_index(&"other".into()).is_err());
    }

    /// Simulates a build in flight: the flag is held and the index is dirty.
    fn hold_build(ops: &IndexOperations, fields: &FieldPath) -> BuildGuard {
        let guard = ops.coordinator.try_begin(fields).unwrap();
        ops.catalog().begin_build(fields).unwrap();
        guard
    }

    /// An optimizer that scans the index on `field` when it is offered.
    fn scanning(field: &'static str) -> impl Fn(&[IndexDescriptor]) -> Result<FindPlan> {
        move |descriptors| {
            Ok(FindPlan {
                index_descriptor: descriptors
                    .iter()
                    .find(|d| d.fields().first() == field)
                    .cloned(),
                ..FindPlan::default()
            })
        }
    }

    #[test]
    fn test_write_during_build_goes_to_index() {
        let (_, records, ops) = setup();
        let name: FieldPath = "name".into();
        ops.create_index(name.clone(), IndexKind::NonUnique).unwrap();

        let guard = hold_build(&ops, &name);
        let doc = put(&records, 1, "ada");
        ops.write_index_entry(&doc).unwrap();
        ops.catalog().end_build(&name).unwrap();
        drop(guard);

        assert_eq!(scan_eq(&ops, "ada"), vec![1]);
    }

    #[test]
    fn test_remove_during_build_leaves_no_stale_entry() {
        let (_, records, ops) = setup();
        let name: FieldPath = "name".into();
        ops.create_index(name.clone(), IndexKind::Unique).unwrap();
        let ada = put(&records, 1, "ada");
        ops.write_index_entry(&ada).unwrap();

        let guard = hold_build(&ops, &name);
        records.remove(&RecordId::new(1)).unwrap();
        ops.remove_index_entry(&ada).unwrap();
        ops.catalog().end_build(&name).unwrap();
        drop(guard);

        assert!(scan_eq(&ops, "ada").is_empty());
        let second = put(&records, 2, "ada");
        ops.write_index_entry(&second).unwrap();
        assert_eq!(scan_eq(&ops, "ada"), vec![2]);
    }

    #[test]
    fn test_plan_skips_index_being_built() {
        let (_, records, ops) = setup();
        put(&records, 1, "ada");
        let name: FieldPath = "name".into();
        ops.create_index(name.clone(), IndexKind::NonUnique).unwrap();

        // the flag is taken before the catalog is marked dirty
        let guard = ops.coordinator.try_begin(&name).unwrap();
        assert!(ops.plan(scanning("name")).unwrap().index_descriptor.is_none());
        drop(guard);

        assert!(ops.plan(scanning("name")).unwrap().index_descriptor.is_some());
    }

    #[test]
    fn test_plan_rebuilds_only_scanned_dirty_index() {
        let (_, records, ops) = setup();
        put(&records, 1, "ada");
        put(&records, 2, "ada");
        let name: FieldPath = "name".into();
        assert!(ops.create_index(name.clone(), IndexKind::Unique).is_err());
        ops.create_index("age".into(), IndexKind::NonUnique).unwrap();

        assert!(ops.plan(scanning("age")).unwrap().index_descriptor.is_some());
        assert!(ops.should_rebuild_index(&name).unwrap());

        let err = ops.plan(scanning("name")).unwrap_err();
        assert!(matches!(err, CairnError::UniqueConstraint(_)));

        records.remove(&RecordId::new(2)).unwrap();
        let plan = ops.plan(scanning("name")).unwrap();
        assert_eq!(plan.index_descriptor.unwrap().fields(), &name);
        assert!(!ops.should_rebuild_index(&name).unwrap());
        assert_eq!(scan_eq(&ops, "ada"), vec![1]);
    }
}
