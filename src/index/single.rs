//! Single-field index: value key -> terminal list of record ids.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CairnError, Result};
use crate::index::descriptor::IndexDescriptor;
use crate::index::key::{FieldValues, OrderableKey};
use crate::index::node::{IndexLevel, IndexNode, RecordIdSet};
use crate::index::scanner::IndexScanner;
use crate::index::{IndexStore, multi_value_keys};
use crate::query::plan::FindPlan;
use crate::store::{IndexMap, KeyValueStore};

#[derive(Debug)]
pub struct SingleFieldIndex {
    descriptor: IndexDescriptor,
    map_name: String,
    store: Arc<dyn KeyValueStore>,
    map: IndexMap,
    write_lock: Mutex<()>,
}

impl SingleFieldIndex {
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

    fn terminal(&self, map: &IndexMap, key: &OrderableKey) -> Result<Vec<crate::util::id::RecordId>> {
        match map.get(key)? {
            Some(IndexNode::Terminal(ids)) => Ok(ids),
            Some(IndexNode::Inner(_)) => Err(CairnError::indexing(format!(
                "unexpected nested entry in {}",
                self.descriptor
            ))),
            None => Ok(Vec::new()),
        }
    }
}

impl IndexStore for SingleFieldIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    fn write(&self, values: &FieldValues) -> Result<()> {
        let field = self.descriptor.fields().first();
        let keys = multi_value_keys(field, values.first_value())?;

        let _guard = self.write_lock.lock();
        let map = &self.map;

        if self.descriptor.is_unique() {
            for key in &keys {
                let ids = self.terminal(&map, key)?;
                if !ids.is_empty() && !ids.contains(&values.id) {
                    return Err(CairnError::unique_constraint(format!(
                        "unique key constraint violated for {key} on field '{field}'"
                    )));
                }
            }
        }

        for key in keys {
            let mut ids = self.terminal(&map, &key)?;
            if !ids.contains(&values.id) {
                ids.push(values.id);
                map.put(key, IndexNode::Terminal(ids))?;
            }
        }
        Ok(())
    }

    fn remove(&self, values: &FieldValues) -> Result<()> {
        let field = self.descriptor.fields().first();
        let keys = multi_value_keys(field, values.first_value())?;

        let _guard = self.write_lock.lock();
        let map = &self.map;
        for key in keys {
            let mut ids = self.terminal(&map, &key)?;
            let before = ids.len();
            ids.retain(|id| *id != values.id);
            if ids.is_empty() {
                map.remove(&key)?;
            } else if ids.len() != before {
                map.put(key, IndexNode::Terminal(ids))?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::index::descriptor::IndexKind;
    use crate::index::key::FieldPath;
    use crate::query::filter::field;
    use crate::query::plan::IndexScanSpec;
    use crate::store::MemoryStore;
    use crate::util::id::RecordId;

    fn index(kind: IndexKind) -> SingleFieldIndex {
        let descriptor = IndexDescriptor::new(kind, FieldPath::single("email"), "users");
        SingleFieldIndex::new(descriptor, "idx", Arc::new(MemoryStore::new())).unwrap()
    }

    fn values(id: u64, value: impl Into<Value>) -> FieldValues {
        FieldValues {
            id: RecordId::new(id),
            fields: FieldPath::single("email"),
            values: vec![("email".to_string(), value.into())],
        }
    }

    fn eq_plan(value: impl Into<Value>) -> FindPlan {
        let filter = field("email").eq(value);
        FindPlan {
            index_scan_spec: Some(IndexScanSpec::new(vec![filter.comparison().unwrap().clone()])),
            ..FindPlan::default()
        }
    }

    #[test]
    fn test_write_scan_remove() {
        let index = index(IndexKind::NonUnique);
        index.write(&values(1, "a@x")).unwrap();
        index.write(&values(2, "a@x")).unwrap();
        index.write(&values(2, "a@x")).unwrap();

        let found: Vec<RecordId> = index.scan(&eq_plan("a@x")).unwrap().into_vec();
        assert_eq!(found, vec![RecordId::new(1), RecordId::new(2)]);

        index.remove(&values(1, "a@x")).unwrap();
        index.remove(&values(2, "a@x")).unwrap();
        assert!(index.scan(&eq_plan("a@x")).unwrap().is_empty());
        assert!(index.map.is_empty().unwrap());
    }

    #[test]
    fn test_array_fan_out() {
        let index = index(IndexKind::NonUnique);
        index.write(&values(1, vec!["a", "b"])).unwrap();
        assert_eq!(index.scan(&eq_plan("b")).unwrap().len(), 1);
        assert_eq!(index.map.len().unwrap(), 2);
    }

    #[test]
    fn test_unique_violation_keeps_first() {
        let index = index(IndexKind::Unique);
        index.write(&values(1, "a@x")).unwrap();
        index.write(&values(1, "a@x")).unwrap();

        let err = index.write(&values(2, "a@x")).unwrap_err();
        assert!(matches!(err, CairnError::UniqueConstraint(_)));
        assert_eq!(
            index.scan(&eq_plan("a@x")).unwrap().into_vec(),
            vec![RecordId::new(1)]
        );
    }

    #[test]
    fn test_unique_violation_on_fan_out_is_atomic() {
        let index = index(IndexKind::Unique);
        index.write(&values(1, "b")).unwrap();

        let err = index.write(&values(2, vec!["a", "b"])).unwrap_err();
        assert!(matches!(err, CairnError::UniqueConstraint(_)));
        assert!(index.scan(&eq_plan("a")).unwrap().is_empty(), "no partial entry for 'a'");
    }

    #[test]
    fn test_non_comparable_value_rejected() {
        let index = index(IndexKind::NonUnique);
        let err = index
            .write(&values(1, crate::data::Document::new()))
            .unwrap_err();
        assert!(matches!(err, CairnError::Indexing(_)));
    }
}
