//! Index tree nodes, level navigation and result id sets.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use ahash::AHashSet;

use crate::error::{CairnError, Result};
use crate::index::key::OrderableKey;
use crate::store::OrderedMap;
use crate::util::id::RecordId;

/// A value in an ordered index map.
///
/// Single-field indexes and the last field of a compound index hold
/// `Terminal` lists; the other compound levels hold `Inner` maps keyed by the
/// next field's value. Inner maps are shared copy-on-write.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexNode {
    Terminal(Vec<RecordId>),
    Inner(Arc<BTreeMap<OrderableKey, IndexNode>>),
}

impl IndexNode {
    pub fn empty_inner() -> Self {
        IndexNode::Inner(Arc::new(BTreeMap::new()))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            IndexNode::Terminal(ids) => ids.is_empty(),
            IndexNode::Inner(map) => map.is_empty(),
        }
    }

    /// Record ids stored at the end of `path` below this node.
    pub fn terminal_at(&self, path: &[OrderableKey]) -> Option<&[RecordId]> {
        match (self, path.split_first()) {
            (IndexNode::Terminal(ids), None) => Some(ids),
            (IndexNode::Inner(map), Some((key, rest))) => map.get(key)?.terminal_at(rest),
            _ => None,
        }
    }

    /// Add `id` at the end of `path`, creating inner levels as needed.
    pub fn insert(&mut self, path: &[OrderableKey], id: RecordId) -> Result<()> {
        match (self, path.split_first()) {
            (IndexNode::Terminal(ids), None) => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
                Ok(())
            }
            (IndexNode::Inner(map), Some((key, rest))) => {
                let child = Arc::make_mut(map).entry(key.clone()).or_insert_with(|| {
                    if rest.is_empty() {
                        IndexNode::Terminal(Vec::new())
                    } else {
                        IndexNode::empty_inner()
                    }
                });
                child.insert(rest, id)
            }
            _ => Err(CairnError::indexing(
                "index node depth does not match the index field count",
            )),
        }
    }

    /// Remove `id` at the end of `path`, pruning emptied levels.
    /// Returns true when this node is empty afterwards.
    pub fn remove(&mut self, path: &[OrderableKey], id: RecordId) -> bool {
        match (self, path.split_first()) {
            (IndexNode::Terminal(ids), None) => {
                ids.retain(|existing| *existing != id);
                ids.is_empty()
            }
            (IndexNode::Inner(map), Some((key, rest))) => {
                if !map.contains_key(key) {
                    return map.is_empty();
                }
                let map = Arc::make_mut(map);
                let emptied = map.get_mut(key).is_some_and(|child| child.remove(rest, id));
                if emptied {
                    map.remove(key);
                }
                map.is_empty()
            }
            (node, _) => node.is_empty(),
        }
    }
}

/// One level of an index tree: the backing map at the root, or a nested
/// map below it. Offers the same ordered navigation for both.
pub enum IndexLevel<'a> {
    Root(&'a dyn OrderedMap<OrderableKey, IndexNode>),
    Nested(&'a BTreeMap<OrderableKey, IndexNode>),
}

impl IndexLevel<'_> {
    pub fn get(&self, key: &OrderableKey) -> Result<Option<IndexNode>> {
        match self {
            IndexLevel::Root(map) => map.get(key),
            IndexLevel::Nested(map) => Ok(map.get(key).cloned()),
        }
    }

    pub fn first_key(&self) -> Result<Option<OrderableKey>> {
        match self {
            IndexLevel::Root(map) => map.first_key(),
            IndexLevel::Nested(map) => Ok(map.keys().next().cloned()),
        }
    }

    pub fn last_key(&self) -> Result<Option<OrderableKey>> {
        match self {
            IndexLevel::Root(map) => map.last_key(),
            IndexLevel::Nested(map) => Ok(map.keys().next_back().cloned()),
        }
    }

    pub fn higher_key(&self, key: &OrderableKey) -> Result<Option<OrderableKey>> {
        match self {
            IndexLevel::Root(map) => map.higher_key(key),
            IndexLevel::Nested(map) => Ok(map
                .range((Bound::Excluded(key), Bound::Unbounded))
                .next()
                .map(|(k, _)| k.clone())),
        }
    }

    pub fn ceiling_key(&self, key: &OrderableKey) -> Result<Option<OrderableKey>> {
        match self {
            IndexLevel::Root(map) => map.ceiling_key(key),
            IndexLevel::Nested(map) => Ok(map.range(key..).next().map(|(k, _)| k.clone())),
        }
    }

    pub fn lower_key(&self, key: &OrderableKey) -> Result<Option<OrderableKey>> {
        match self {
            IndexLevel::Root(map) => map.lower_key(key),
            IndexLevel::Nested(map) => Ok(map.range(..key).next_back().map(|(k, _)| k.clone())),
        }
    }

    pub fn floor_key(&self, key: &OrderableKey) -> Result<Option<OrderableKey>> {
        match self {
            IndexLevel::Root(map) => map.floor_key(key),
            IndexLevel::Nested(map) => Ok(map.range(..=key).next_back().map(|(k, _)| k.clone())),
        }
    }

    /// Key following `current` in the given direction; the first (or last)
    /// key when `current` is `None`.
    pub fn next_key(
        &self,
        current: Option<&OrderableKey>,
        reverse: bool,
    ) -> Result<Option<OrderableKey>> {
        match (current, reverse) {
            (None, false) => self.first_key(),
            (None, true) => self.last_key(),
            (Some(key), false) => self.higher_key(key),
            (Some(key), true) => self.lower_key(key),
        }
    }
}

/// Duplicate-free record id set that keeps first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct RecordIdSet {
    order: Vec<RecordId>,
    seen: AHashSet<RecordId>,
}

impl RecordIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id was already present.
    pub fn insert(&mut self, id: RecordId) -> bool {
        if self.seen.insert(id) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    pub fn extend<'a>(&mut self, ids: impl IntoIterator<Item = &'a RecordId>) {
        for id in ids {
            self.insert(*id);
        }
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordId> {
        self.order.iter()
    }

    pub fn into_vec(self) -> Vec<RecordId> {
        self.order
    }
}

impl FromIterator<RecordId> for RecordIdSet {
    fn from_iter<T: IntoIterator<Item = RecordId>>(iter: T) -> Self {
        let mut set = RecordIdSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl IntoIterator for RecordIdSet {
    type Item = RecordId;
    type IntoIter = std::vec::IntoIter<RecordId>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn key(v: impl Into<Value>) -> OrderableKey {
        OrderableKey::from_value(&v.into()).unwrap()
    }

    fn id(n: u64) -> RecordId {
        RecordId::new(n)
    }

    #[test]
    fn test_insert_and_prune() {
        let mut root = IndexNode::empty_inner();
        let path_x = [key("x"), key(1)];
        let path_y = [key("y"), key(1)];

        root.insert(&path_x, id(1)).unwrap();
        root.insert(&path_x, id(1)).unwrap();
        root.insert(&path_y, id(2)).unwrap();
        assert_eq!(root.terminal_at(&path_x), Some(&[id(1)][..]));

        assert!(!root.remove(&path_x, id(1)));
        assert_eq!(root.terminal_at(&path_x), None);
        if let IndexNode::Inner(map) = &root {
            assert!(!map.contains_key(&key("x")), "emptied sub-map must be pruned");
        }
        assert!(root.remove(&path_y, id(2)));
    }

    #[test]
    fn test_depth_mismatch_is_error() {
        let mut terminal = IndexNode::Terminal(vec![]);
        assert!(terminal.insert(&[key(1)], id(1)).is_err());
    }

    #[test]
    fn test_nested_level_navigation() {
        let mut map = BTreeMap::new();
        for n in [1, 3, 5] {
            map.insert(key(n), IndexNode::Terminal(vec![id(n as u64)]));
        }
        let level = IndexLevel::Nested(&map);
        assert_eq!(level.ceiling_key(&key(2)).unwrap(), Some(key(3)));
        assert_eq!(level.higher_key(&key(3)).unwrap(), Some(key(5)));
        assert_eq!(level.floor_key(&key(4)).unwrap(), Some(key(3)));
        assert_eq!(level.lower_key(&key(1)).unwrap(), None);
        assert_eq!(level.next_key(None, true).unwrap(), Some(key(5)));
    }

    #[test]
    fn test_record_id_set_keeps_first_seen_order() {
        let mut set = RecordIdSet::new();
        assert!(set.insert(id(3)));
        assert!(set.insert(id(1)));
        assert!(!set.insert(id(3)));
        set.extend(&[id(2), id(1)]);
        assert_eq!(set.into_vec(), vec![id(3), id(1), id(2)]);
    }
}
