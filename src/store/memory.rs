//! In-memory [`KeyValueStore`] backed by `BTreeMap`s.

use std::any::Any;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;

use crate::data::Document;
use crate::error::{CairnError, Result};
use crate::index::descriptor::IndexMeta;
use crate::index::key::{FieldPath, OrderableKey};
use crate::index::node::IndexNode;
use crate::store::{IndexMap, KeyValueStore, MetaMap, OrderedMap, RecordMap, TextMap};
use crate::util::id::RecordId;

/// A single named map held in memory.
#[derive(Debug)]
pub struct MemoryMap<K, V> {
    name: String,
    entries: RwLock<BTreeMap<K, V>>,
    dropped: AtomicBool,
}

impl<K: Ord, V> MemoryMap<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
            dropped: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.dropped.load(Ordering::Acquire) {
            return Err(CairnError::storage(format!(
                "map '{}' has been dropped",
                self.name
            )));
        }
        Ok(())
    }

    fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
        self.entries.write().clear();
    }
}

impl<K, V> OrderedMap<K, V> for MemoryMap<K, V>
where
    K: Ord + Clone + Send + Sync + std::fmt::Debug,
    V: Clone + Send + Sync + std::fmt::Debug,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.check_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn contains_key(&self, key: &K) -> Result<bool> {
        self.check_open()?;
        Ok(self.entries.read().contains_key(key))
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        self.check_open()?;
        self.entries.write().insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.check_open()?;
        Ok(self.entries.write().remove(key))
    }

    fn clear(&self) -> Result<()> {
        self.check_open()?;
        self.entries.write().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        self.check_open()?;
        Ok(self.entries.read().len())
    }

    fn first_key(&self) -> Result<Option<K>> {
        self.check_open()?;
        Ok(self.entries.read().keys().next().cloned())
    }

    fn last_key(&self) -> Result<Option<K>> {
        self.check_open()?;
        Ok(self.entries.read().keys().next_back().cloned())
    }

    fn higher_key(&self, key: &K) -> Result<Option<K>> {
        self.check_open()?;
        Ok(self
            .entries
            .read()
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone()))
    }

    fn ceiling_key(&self, key: &K) -> Result<Option<K>> {
        self.check_open()?;
        Ok(self
            .entries
            .read()
            .range((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone()))
    }

    fn lower_key(&self, key: &K) -> Result<Option<K>> {
        self.check_open()?;
        Ok(self
            .entries
            .read()
            .range((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .map(|(k, _)| k.clone()))
    }

    fn floor_key(&self, key: &K) -> Result<Option<K>> {
        self.check_open()?;
        Ok(self
            .entries
            .read()
            .range((Bound::Unbounded, Bound::Included(key)))
            .next_back()
            .map(|(k, _)| k.clone()))
    }
}

type AnyMap = Arc<dyn Any + Send + Sync>;

struct Registered {
    map: AnyMap,
    on_drop: Box<dyn Fn() + Send + Sync>,
}

/// Keeps every map in process memory. Dropping the store discards all data.
#[derive(Default)]
pub struct MemoryStore {
    maps: RwLock<AHashMap<String, Registered>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let maps = self.maps.read();
        let mut names: Vec<&String> = maps.keys().collect();
        names.sort();
        f.debug_struct("MemoryStore").field("maps", &names).finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the maps currently open, sorted.
    pub fn map_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.maps.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn open<K, V>(&self, name: &str) -> Result<Arc<MemoryMap<K, V>>>
    where
        K: Ord + Clone + Send + Sync + std::fmt::Debug + 'static,
        V: Clone + Send + Sync + std::fmt::Debug + 'static,
    {
        if let Some(existing) = self.maps.read().get(name) {
            return downcast(name, existing.map.clone());
        }

        let mut maps = self.maps.write();
        if let Some(existing) = maps.get(name) {
            return downcast(name, existing.map.clone());
        }

        debug!("opening map '{name}'");
        let map = Arc::new(MemoryMap::<K, V>::new(name));
        let handle = map.clone();
        maps.insert(
            name.to_string(),
            Registered {
                map: map.clone(),
                on_drop: Box::new(move || handle.mark_dropped()),
            },
        );
        Ok(map)
    }
}

fn downcast<K, V>(name: &str, map: AnyMap) -> Result<Arc<MemoryMap<K, V>>>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    map.downcast::<MemoryMap<K, V>>().map_err(|_| {
        CairnError::storage(format!("map '{name}' is open with a different key or value type"))
    })
}

impl KeyValueStore for MemoryStore {
    fn open_record_map(&self, name: &str) -> Result<RecordMap> {
        let map: Arc<MemoryMap<RecordId, Arc<Document>>> = self.open(name)?;
        Ok(map)
    }

    fn open_meta_map(&self, name: &str) -> Result<MetaMap> {
        let map: Arc<MemoryMap<FieldPath, IndexMeta>> = self.open(name)?;
        Ok(map)
    }

    fn open_index_map(&self, name: &str) -> Result<IndexMap> {
        let map: Arc<MemoryMap<OrderableKey, IndexNode>> = self.open(name)?;
        Ok(map)
    }

    fn open_text_map(&self, name: &str) -> Result<TextMap> {
        let map: Arc<MemoryMap<String, Vec<RecordId>>> = self.open(name)?;
        Ok(map)
    }

    fn has_map(&self, name: &str) -> bool {
        self.maps.read().contains_key(name)
    }

    fn drop_map(&self, name: &str) -> Result<()> {
        if let Some(registered) = self.maps.write().remove(name) {
            debug!("dropping map '{name}'");
            (registered.on_drop)();
        }
        Ok(())
    }
}
