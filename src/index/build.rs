//! Per field-set build coordination.
//!
//! Each field-set moves `Idle -> Building -> Idle`. The transition into
//! `Building` is a compare-and-set on a flag owned by the coordinator, so at
//! most one build runs for a field-set at a time. Builds of different
//! field-sets are independent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::index::key::FieldPath;

#[derive(Debug, Default)]
pub struct BuildCoordinator {
    flags: RwLock<AHashMap<FieldPath, Arc<AtomicBool>>>,
}

impl BuildCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, fields: &FieldPath) -> Arc<AtomicBool> {
        if let Some(flag) = self.flags.read().get(fields) {
            return flag.clone();
        }
        self.flags
            .write()
            .entry(fields.clone())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    /// Enter `Building` for `fields`. Returns `None` when a build is already
    /// running. The returned guard moves the field-set back to `Idle` when dropped.
    pub fn try_begin(&self, fields: &FieldPath) -> Option<BuildGuard> {
        let flag = self.flag(fields);
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BuildGuard { flag })
    }

    pub fn is_building(&self, fields: &FieldPath) -> bool {
        self.flags
            .read()
            .get(fields)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn any_building(&self) -> bool {
        self.flags
            .read()
            .values()
            .any(|flag| flag.load(Ordering::Acquire))
    }

    pub fn remove(&self, fields: &FieldPath) {
        self.flags.write().remove(fields);
    }

    pub fn clear(&self) {
        self.flags.write().clear();
    }
}

/// Held for the duration of a build.
#[derive(Debug)]
pub struct BuildGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
