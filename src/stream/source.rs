use std::collections::VecDeque;

use ahash::AHashSet;

use crate::data::Value;
use crate::error::Result;
use crate::query::filter::Filter;
use crate::store::RecordMap;
use crate::stream::{RecordEntry, RecordStream};
use crate::util::id::RecordId;

/// At most one record, looked up by id on the first pull.
pub struct ByIdStream {
    id: Option<RecordId>,
    records: RecordMap,
}

impl ByIdStream {
    /// A value that cannot be a record id selects nothing.
    pub fn new(id: &Value, records: RecordMap) -> Self {
        let id = match id {
            Value::String(text) => RecordId::parse(text).ok(),
            Value::Int64(value) if *value >= 0 => Some(RecordId::new(*value as u64)),
            _ => None,
        };
        Self { id, records }
    }
}

impl Iterator for ByIdStream {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.id.take()?;
        match self.records.get(&id) {
            Ok(Some(document)) => Some(Ok((id, document))),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Re-fetches the records of an index scan, in scan order. Ids whose record
/// has gone away in the meantime are skipped.
pub struct IndexedStream {
    ids: std::vec::IntoIter<RecordId>,
    records: RecordMap,
    failed: bool,
}

impl IndexedStream {
    pub fn new(ids: Vec<RecordId>, records: RecordMap) -> Self {
        Self {
            ids: ids.into_iter(),
            records,
            failed: false,
        }
    }
}

impl Iterator for IndexedStream {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for id in self.ids.by_ref() {
            match self.records.get(&id) {
                Ok(Some(document)) => return Some(Ok((id, document))),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Yields the records the filter accepts.
pub struct FilteredStream {
    inner: RecordStream,
    filter: Filter,
    failed: bool,
}

impl FilteredStream {
    pub fn new(inner: RecordStream, filter: Filter) -> Self {
        Self {
            inner,
            filter,
            failed: false,
        }
    }
}

impl Iterator for FilteredStream {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for item in self.inner.by_ref() {
            let result = item.and_then(|(id, document)| {
                Ok(self.filter.apply(&document)?.then_some((id, document)))
            });
            match result {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Concatenates the branch streams of an OR plan.
pub struct UnionStream {
    branches: VecDeque<RecordStream>,
}

impl UnionStream {
    pub fn new(branches: impl IntoIterator<Item = RecordStream>) -> Self {
        Self {
            branches: branches.into_iter().collect(),
        }
    }
}

impl Iterator for UnionStream {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let branch = self.branches.front_mut()?;
            match branch.next() {
                Some(Ok(entry)) => return Some(Ok(entry)),
                Some(Err(e)) => {
                    self.branches.clear();
                    return Some(Err(e));
                }
                None => {
                    self.branches.pop_front();
                }
            }
        }
    }
}

/// Drops records already yielded, keeping the first occurrence.
pub struct DistinctStream<I> {
    inner: I,
    seen: AHashSet<RecordId>,
}

impl<I> DistinctStream<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            seen: AHashSet::new(),
        }
    }
}

impl<I: Iterator<Item = Result<RecordEntry>>> Iterator for DistinctStream<I> {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok((id, document)) => {
                    if self.seen.insert(id) {
                        return Some(Ok((id, document)));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
