//! Compound index over several fields.
//!
//! The backing map is keyed by the first field's value and holds an
//! `IndexNode::Inner` tree with one level per following field, ending in a
//! terminal id list at the last field. Only the first field may fan out over
//! an array.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::data::Value;
use crate::error::{CairnError, Result};
use crate::index::descriptor::IndexDescriptor;
use crate::index::key::{FieldValues, OrderableKey};
use crate::index::node::{IndexLevel, IndexNode, RecordIdSet};
use crate::index::scanner::IndexScanner;
use crate::index::{IndexStore, multi_value_keys, single_value_key};
use crate::query::plan::FindPlan;
use crate::store::{IndexMap, KeyValueStore};

#[derive(Debug)]
pub struct CompoundIndex {
    descriptor: IndexDescriptor,
    map_name: String,
    store: Arc<dyn KeyValueStore>,
    map: IndexMap,
    write_lock: Mutex<()>,
}

impl CompoundIndex {
    pub fn new(
        descriptor: IndexDescriptor,
        map_name: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let map_name = map_name.into();
        let map = store.open_index_map(&map_name)?;
        Ok(Self {
            descriptor,
            map_name,
            store,
            map,
            write_lock: Mutex::new(()),
        })
    }

    /// First-field keys and the key path below them.
    fn key_paths(&self, values: &FieldValues) -> Result<(Vec<OrderableKey>, Vec<OrderableKey>)> {
        let fields = self.descriptor.fields().fields();
        let first = multi_value_keys(&fields[0], values.first_value())?;

        let mut rest = Vec::with_capacity(fields.len() - 1);
        for field in &fields[1..] {
            let value = values.get(field).cloned().unwrap_or(Value::Null);
            if matches!(value, Value::Array(_)) {
                return Err(CairnError::indexing(format!(
                    "field '{field}' of compound index {} holds an array; only the first field may be multi-valued",
                    self.descriptor.fields()
                )));
            }
            rest.push(single_value_key(field, &value)?);
        }
        Ok((first, rest))
    }
}

impl IndexStore for CompoundIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    fn write(&self, values: &FieldValues) -> Result<()> {
        let (first_keys, rest) = self.key_paths(values)?;

        let _guard = self.write_lock.lock();
        let map = &self.map;

        if self.descriptor.is_unique() {
            for key in &first_keys {
                let Some(node) = map.get(key)? else { continue };
                if let Some(ids) = node.terminal_at(&rest) {
                    if !ids.is_empty() && !ids.contains(&values.id) {
                        return Err(CairnError::unique_constraint(format!(
                            "unique key constraint violated for {key} on fields {}",
                            self.descriptor.fields()
                        )));
                    }
                }
            }
        }

        for key in first_keys {
            let mut node = map.get(&key)?.unwrap_or_else(IndexNode::empty_inner);
            node.insert(&rest, values.id)?;
            map.put(key, node)?;
        }
        Ok(())
    }

    fn remove(&self, values: &FieldValues) -> Result<()> {
        let (first_keys, rest) = self.key_paths(values)?;

        let _guard = self.write_lock.lock();
        let map = &self.map;
        for key in first_keys {
            let Some(mut node) = map.get(&key)? else { continue };
            if node.remove(&rest, values.id) {
                map.remove(&key)?;
            } else {
                map.put(key, node)?;
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.map.clear()
    }

    fn drop_index(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.store.drop_map(&self.map_name)
    }

    fn scan(&self, plan: &FindPlan) -> Result<RecordIdSet> {
        let map = &self.map;
        IndexScanner::new(self.descriptor.fields().fields(), &plan.index_scan_order)
            .scan(IndexLevel::Root(map.as_ref()), plan.scan_filters())
    }
}
