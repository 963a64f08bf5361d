//! Execution plans produced by the find optimizer.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::data::Value;
use crate::index::descriptor::IndexDescriptor;
use crate::query::filter::{ComparisonFilter, Filter};
use crate::query::options::{Collator, SortOrder};

/// Per-field comparison filters handed to an index scan, in the index's field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexScanSpec {
    pub filters: Vec<ComparisonFilter>,
}

impl IndexScanSpec {
    pub fn new(filters: Vec<ComparisonFilter>) -> Self {
        Self { filters }
    }
}

/// How one query is executed. Created per find call and never persisted.
#[derive(Debug, Clone, Default)]
pub struct FindPlan {
    /// Value of an `_id` equality filter; bypasses every index.
    pub by_id: Option<Value>,
    pub index_descriptor: Option<IndexDescriptor>,
    pub index_scan_spec: Option<IndexScanSpec>,
    /// Field -> walk that field's index level in descending order.
    pub index_scan_order: AHashMap<String, bool>,
    /// Predicate applied to every record the source yields.
    pub residual_filter: Option<Filter>,
    /// Sort requiring the stream to be materialized.
    pub blocking_sort: Vec<(String, SortOrder)>,
    pub collator: Option<Arc<dyn Collator>>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    /// Branches of an OR filter; results are unioned and deduplicated.
    pub sub_plans: Vec<FindPlan>,
}

impl FindPlan {
    pub fn is_collection_scan(&self) -> bool {
        self.by_id.is_none() && self.index_descriptor.is_none() && self.sub_plans.is_empty()
    }

    /// Indexes this plan scans, including those of its OR branches.
    pub fn index_descriptors(&self) -> Vec<&IndexDescriptor> {
        let mut descriptors: Vec<&IndexDescriptor> = self.index_descriptor.iter().collect();
        for sub in &self.sub_plans {
            descriptors.extend(sub.index_descriptors());
        }
        descriptors
    }

    pub fn scan_filters(&self) -> &[ComparisonFilter] {
        self.index_scan_spec
            .as_ref()
            .map(|spec| spec.filters.as_slice())
            .unwrap_or(&[])
    }
}

impl fmt::Display for FindPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.sub_plans.is_empty() {
            write!(f, "union(")?;
            for (i, sub) in self.sub_plans.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{sub}")?;
            }
            write!(f, ")")?;
        } else if let Some(id) = &self.by_id {
            write!(f, "by-id({})", id.to_json())?;
        } else if let Some(descriptor) = &self.index_descriptor {
            let filters: Vec<String> = self.scan_filters().iter().map(|c| c.to_string()).collect();
            write!(f, "index-scan({} [{}])", descriptor.fields(), filters.join(", "))?;
        } else {
            write!(f, "collection-scan")?;
        }
        if let Some(residual) = &self.residual_filter {
            write!(f, " filter{residual}")?;
        }
        if !self.blocking_sort.is_empty() {
            let keys: Vec<String> = self
                .blocking_sort
                .iter()
                .map(|(field, order)| format!("{field} {order:?}"))
                .collect();
            write!(f, " sort[{}]", keys.join(", "))?;
        }
        Ok(())
    }
}
