//! Recursive scan of single-field and compound index trees.
//!
//! The scanner applies the first comparison filter to the current level.
//! Matching keys lead either to terminal id lists, which are collected, or to
//! nested levels, which are scanned with the remaining filters. Once the
//! filters run out, every id below the current level is collected, walking
//! each level in the direction requested for its field.

use std::cmp::Ordering;

use ahash::AHashMap;

use crate::data::Value;
use crate::error::{CairnError, Result};
use crate::index::key::OrderableKey;
use crate::index::node::{IndexLevel, IndexNode, RecordIdSet};
use crate::query::filter::{ComparisonFilter, Condition, RangeOp};

pub struct IndexScanner<'a> {
    fields: &'a [String],
    scan_order: &'a AHashMap<String, bool>,
}

impl<'a> IndexScanner<'a> {
    pub fn new(fields: &'a [String], scan_order: &'a AHashMap<String, bool>) -> Self {
        Self { fields, scan_order }
    }

    /// Scan `root` with `filters`, which must target the index fields in order.
    pub fn scan(&self, root: IndexLevel<'_>, filters: &[ComparisonFilter]) -> Result<RecordIdSet> {
        if filters.len() > self.fields.len() {
            return Err(CairnError::filter(format!(
                "{} filters given for an index on {} fields",
                filters.len(),
                self.fields.len()
            )));
        }
        for (filter, field) in filters.iter().zip(self.fields) {
            if filter.field != *field {
                return Err(CairnError::filter(format!(
                    "filter on '{}' cannot scan index level '{field}'",
                    filter.field
                )));
            }
        }

        let mut results = RecordIdSet::new();
        self.scan_level(&root, 0, filters, &mut results)?;
        Ok(results)
    }

    fn is_reverse(&self, depth: usize) -> bool {
        self.fields
            .get(depth)
            .and_then(|field| self.scan_order.get(field))
            .copied()
            .unwrap_or(false)
    }

    fn scan_level(
        &self,
        level: &IndexLevel<'_>,
        depth: usize,
        filters: &[ComparisonFilter],
        results: &mut RecordIdSet,
    ) -> Result<()> {
        let reverse = self.is_reverse(depth);
        match filters.split_first() {
            None => {
                let mut current = level.next_key(None, reverse)?;
                while let Some(key) = current {
                    if let Some(node) = level.get(&key)? {
                        self.collect(node, depth, &[], results)?;
                    }
                    current = level.next_key(Some(&key), reverse)?;
                }
            }
            Some((filter, rest)) => {
                for key in matching_keys(level, filter, reverse)? {
                    if let Some(node) = level.get(&key)? {
                        self.collect(node, depth, rest, results)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn collect(
        &self,
        node: IndexNode,
        depth: usize,
        rest: &[ComparisonFilter],
        results: &mut RecordIdSet,
    ) -> Result<()> {
        match node {
            IndexNode::Terminal(ids) => {
                results.extend(&ids);
                Ok(())
            }
            IndexNode::Inner(map) => {
                self.scan_level(&IndexLevel::Nested(&map), depth + 1, rest, results)
            }
        }
    }
}

fn filter_key(filter: &ComparisonFilter, value: &Value) -> Result<OrderableKey> {
    OrderableKey::from_value(value).ok_or_else(|| {
        CairnError::filter(format!(
            "{} value in filter on '{}' is not comparable",
            value.type_name(),
            filter.field
        ))
    })
}

/// Keys of `level` selected by `filter`, in walk order.
fn matching_keys(
    level: &IndexLevel<'_>,
    filter: &ComparisonFilter,
    reverse: bool,
) -> Result<Vec<OrderableKey>> {
    match &filter.condition {
        Condition::Eq(value) => {
            let key = filter_key(filter, value)?;
            Ok(level.get(&key)?.map(|_| key).into_iter().collect())
        }
        Condition::In(values) => {
            let mut keys = values
                .iter()
                .map(|v| filter_key(filter, v))
                .collect::<Result<Vec<_>>>()?;
            keys.sort();
            keys.dedup();
            if reverse {
                keys.reverse();
            }
            let mut found = Vec::with_capacity(keys.len());
            for key in keys {
                if level.get(&key)?.is_some() {
                    found.push(key);
                }
            }
            Ok(found)
        }
        Condition::Range(op, bound) => {
            let bound = filter_key(filter, bound)?;
            let mut keys = range_keys(level, *op, &bound)?;
            if reverse {
                keys.reverse();
            }
            Ok(keys)
        }
        Condition::Ne(value) => {
            let excluded = [filter_key(filter, value)?];
            keys_excluding(level, &excluded, reverse)
        }
        Condition::NotIn(values) => {
            let excluded = values
                .iter()
                .map(|v| filter_key(filter, v))
                .collect::<Result<Vec<_>>>()?;
            keys_excluding(level, &excluded, reverse)
        }
        Condition::Text(_) => Err(CairnError::filter(format!(
            "text filter on '{}' cannot scan an ordered index",
            filter.field
        ))),
    }
}

/// Ascending keys satisfying `op bound` within the bound's key class.
fn range_keys(level: &IndexLevel<'_>, op: RangeOp, bound: &OrderableKey) -> Result<Vec<OrderableKey>> {
    let class = bound.class();
    let mut keys = Vec::new();
    match op {
        RangeOp::Gt | RangeOp::Gte => {
            let mut current = if op == RangeOp::Gt {
                level.higher_key(bound)?
            } else {
                level.ceiling_key(bound)?
            };
            while let Some(key) = current {
                if key.class() != class {
                    break;
                }
                current = level.higher_key(&key)?;
                keys.push(key);
            }
        }
        RangeOp::Lt | RangeOp::Lte => {
            let mut current = if op == RangeOp::Lt {
                level.lower_key(bound)?
            } else {
                level.floor_key(bound)?
            };
            while let Some(key) = current {
                if key.class() != class {
                    break;
                }
                current = level.lower_key(&key)?;
                keys.push(key);
            }
            keys.reverse();
        }
    }
    Ok(keys)
}

fn keys_excluding(
    level: &IndexLevel<'_>,
    excluded: &[OrderableKey],
    reverse: bool,
) -> Result<Vec<OrderableKey>> {
    let mut keys = Vec::new();
    let mut current = level.next_key(None, reverse)?;
    while let Some(key) = current {
        current = level.next_key(Some(&key), reverse)?;
        if !excluded.iter().any(|e| e.cmp(&key) == Ordering::Equal) {
            keys.push(key);
        }
    }
    Ok(keys)
}
