//! Collection facade tying the record map, the indexes and the query
//! pipeline together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::config::CollectionConfig;
use crate::data::Document;
use crate::error::{CairnError, Result};
use crate::event::{EventBus, IndexEventListener};
use crate::index::build::BuildCoordinator;
use crate::index::descriptor::{IndexDescriptor, IndexKind};
use crate::index::key::FieldPath;
use crate::index::operations::IndexOperations;
use crate::processor::{Processor, ProcessorChain};
use crate::query::filter::Filter;
use crate::query::options::FindOptions;
use crate::query::plan::FindPlan;
use crate::query::planner::FindOptimizer;
use crate::store::{KeyValueStore, MemoryStore, RecordMap};
use crate::stream::{DocumentCursor, build_stream};
use crate::util::id::{IdGenerator, RecordId};

/// A named set of documents with secondary indexes.
#[derive(Debug)]
pub struct Collection {
    name: String,
    store: Arc<dyn KeyValueStore>,
    records: RecordMap,
    indexes: IndexOperations,
    optimizer: FindOptimizer,
    ids: IdGenerator,
    processors: RwLock<ProcessorChain>,
    events: Arc<EventBus>,
    write_lock: Mutex<()>,
    dropped: AtomicBool,
}

impl Collection {
    /// Open (or create) a collection.
    ///
    /// # Arguments
    ///
    /// * `name` - The collection name. Must not be blank or start with `$`,
    ///   which is reserved for index and metadata maps.
    /// * `store` - The key-value store holding records and indexes.
    /// * `config` - The collection configuration.
    pub fn open(
        name: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        config: CollectionConfig,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() || name.starts_with('$') {
            return Err(CairnError::validation(format!(
                "'{name}' is not a valid collection name"
            )));
        }

        let records = store.open_record_map(&name)?;
        let events = Arc::new(EventBus::new());
        let indexes = IndexOperations::new(
            name.clone(),
            store.clone(),
            records.clone(),
            &config,
            Arc::new(BuildCoordinator::new()),
            events.clone(),
        )?;
        let ids = match config.node_id {
            Some(node_id) => IdGenerator::new(node_id)?,
            None => IdGenerator::with_random_node(),
        };

        debug!("opened collection '{name}'");
        Ok(Self {
            name,
            store,
            records,
            indexes,
            optimizer: FindOptimizer::new(config.collator()),
            ids,
            processors: RwLock::new(ProcessorChain::new()),
            events,
            write_lock: Mutex::new(()),
            dropped: AtomicBool::new(false),
        })
    }

    /// Open a collection backed by a fresh [`MemoryStore`].
    pub fn in_memory(name: impl Into<String>) -> Result<Self> {
        Self::open(name, Arc::new(MemoryStore::new()), CollectionConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_dropped() {
            return Err(CairnError::invalid_operation(format!(
                "collection '{}' has been dropped",
                self.name
            )));
        }
        Ok(())
    }

    /// Insert a document and return its id. A document without `_id` gets a
    /// generated one; an existing id is a unique-constraint violation.
    ///
    /// Nothing is stored when an index rejects the document.
    pub fn insert(&self, document: Document) -> Result<RecordId> {
        let _guard = self.write_lock.lock();
        self.check_open()?;
        let mut document = self.processors.read().process_before_write(document)?;
        let id = match document.id()? {
            Some(id) => id,
            None => {
                let id = self.ids.next_id();
                document.set_id(id);
                id
            }
        };
        if self.records.contains_key(&id)? {
            return Err(CairnError::unique_constraint(format!(
                "record {id} already exists in '{}'",
                self.name
            )));
        }

        let document = Arc::new(document);
        self.records.put(id, document.clone())?;
        if let Err(e) = self.indexes.write_index_entry(&document) {
            self.records.remove(&id)?;
            return Err(e);
        }
        Ok(id)
    }

    /// Insert documents one by one, stopping at the first failure. Documents
    /// inserted before the failure stay.
    pub fn insert_many(&self, documents: impl IntoIterator<Item = Document>) -> Result<Vec<RecordId>> {
        documents.into_iter().map(|doc| self.insert(doc)).collect()
    }

    /// Replace the record `id`. The previous version is kept when an index
    /// rejects the new one.
    pub fn update(&self, id: RecordId, document: Document) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.check_open()?;
        let old = self.records.get(&id)?.ok_or_else(|| {
            CairnError::invalid_id(format!("no record {id} in '{}'", self.name))
        })?;
        let mut document = self.processors.read().process_before_write(document)?;
        document.set_id(id);

        let document = Arc::new(document);
        self.records.put(id, document.clone())?;
        if let Err(e) = self.indexes.update_index_entry(&old, &document) {
            self.records.put(id, old)?;
            return Err(e);
        }
        Ok(())
    }

    /// Remove the record `id`, returning it if it existed.
    ///
    /// The record leaves the record map before its index entries are removed,
    /// so a build running concurrently cannot index it again afterwards.
    pub fn remove(&self, id: RecordId) -> Result<Option<Document>> {
        let _guard = self.write_lock.lock();
        self.check_open()?;
        let Some(old) = self.records.remove(&id)? else {
            return Ok(None);
        };
        if let Err(e) = self.indexes.remove_index_entry(&old) {
            self.records.put(id, old)?;
            return Err(e);
        }
        let document = self
            .processors
            .read()
            .process_after_read(Document::clone(&old))?;
        Ok(Some(document))
    }

    /// Remove every record matching `filter` and return how many were removed.
    pub fn remove_where(&self, filter: &Filter) -> Result<usize> {
        let plan = self.explain(filter, &FindOptions::default())?;
        let ids = build_stream(&plan, &self.records, &self.indexes)?
            .map(|entry| entry.map(|(id, _)| id))
            .collect::<Result<Vec<_>>>()?;

        let mut removed = 0;
        for id in ids {
            if self.remove(id)?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn get_by_id(&self, id: RecordId) -> Result<Option<Document>> {
        self.check_open()?;
        match self.records.get(&id)? {
            Some(document) => self
                .processors
                .read()
                .process_after_read(Document::clone(&document))
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn size(&self) -> Result<usize> {
        self.check_open()?;
        self.records.len()
    }

    pub fn create_index(&self, fields: FieldPath, kind: IndexKind) -> Result<IndexDescriptor> {
        self.check_open()?;
        self.indexes.create_index(fields, kind)
    }

    pub fn drop_index(&self, fields: &FieldPath) -> Result<()> {
        self.check_open()?;
        self.indexes.drop_index(fields)
    }

    pub fn drop_all_indices(&self) -> Result<()> {
        self.check_open()?;
        self.indexes.drop_all_indices()
    }

    pub fn rebuild_index(&self, fields: &FieldPath) -> Result<()> {
        self.check_open()?;
        self.indexes.rebuild_index(fields)
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        self.check_open()?;
        self.indexes.list_indexes()
    }

    /// True when an index starts with `fields`.
    pub fn has_index(&self, fields: &FieldPath) -> Result<bool> {
        self.check_open()?;
        self.indexes.has_index(fields)
    }

    pub fn is_indexing(&self, fields: &FieldPath) -> Result<bool> {
        self.check_open()?;
        self.indexes.is_indexing(fields)
    }

    pub fn find(&self, filter: &Filter) -> Result<DocumentCursor> {
        self.find_with(filter, &FindOptions::default())
    }

    /// Run a query. Negative skip or limit values fail here, filter and sort
    /// errors on individual records surface while iterating the cursor.
    pub fn find_with(&self, filter: &Filter, options: &FindOptions) -> Result<DocumentCursor> {
        let plan = self.explain(filter, options)?;
        let stream = build_stream(&plan, &self.records, &self.indexes)?;
        Ok(DocumentCursor::new(stream, self.processors.read().clone()))
    }

    /// The plan a find call with these arguments would execute. Dirty
    /// indexes the plan scans are rebuilt first.
    pub fn explain(&self, filter: &Filter, options: &FindOptions) -> Result<FindPlan> {
        self.check_open()?;
        self.indexes
            .plan(|descriptors| self.optimizer.optimize(filter, options, descriptors))
    }

    pub fn add_processor(&self, processor: Arc<dyn Processor>) {
        self.processors.write().add(processor);
    }

    pub fn subscribe(&self, listener: Arc<dyn IndexEventListener>) {
        self.events.subscribe(listener);
    }

    /// Drop every index and the record map. The collection is unusable afterwards.
    pub fn drop(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.check_open()?;
        self.indexes.drop_all_indices()?;
        if let Err(e) = self.records.clear() {
            warn!("failed to clear records of '{}': {e}", self.name);
        }
        self.store.drop_map(self.records.name())?;
        self.dropped.store(true, Ordering::Release);
        info!("dropped collection '{}'", self.name);
        Ok(())
    }
}
