//! Compiles a filter and find options into a [`FindPlan`].

use std::sync::Arc;

use log::debug;

use crate::data::ID_FIELD;
use crate::error::{CairnError, Result};
use crate::index::descriptor::IndexDescriptor;
use crate::index::key::FieldPath;
use crate::query::filter::{ComparisonFilter, Condition, Filter};
use crate::query::options::{Collator, FindOptions, SortOrder};
use crate::query::plan::{FindPlan, IndexScanSpec};

/// Chooses between id lookup, index scans and collection scans.
#[derive(Debug, Clone)]
pub struct FindOptimizer {
    collator: Arc<dyn Collator>,
}

/// The best non-text index found for a conjunction.
struct Candidate<'a> {
    descriptor: &'a IndexDescriptor,
    covered: usize,
}

impl<'a> Candidate<'a> {
    /// Longer covered prefix wins, then unique over non-unique, then fewer
    /// fields. Otherwise the earlier candidate stays.
    fn beats(&self, other: &Candidate<'_>) -> bool {
        if self.covered != other.covered {
            return self.covered > other.covered;
        }
        if self.descriptor.is_unique() != other.descriptor.is_unique() {
            return self.descriptor.is_unique();
        }
        self.descriptor.fields().len() < other.descriptor.fields().len()
    }
}

fn residual(terms: impl IntoIterator<Item = Filter>) -> Option<Filter> {
    match Filter::and(terms) {
        Filter::All => None,
        filter => Some(filter),
    }
}

impl FindOptimizer {
    /// `collator` orders strings when find options do not name one.
    pub fn new(collator: Arc<dyn Collator>) -> Self {
        Self { collator }
    }

    /// Build the plan for `filter` given the usable index descriptors.
    pub fn optimize(
        &self,
        filter: &Filter,
        options: &FindOptions,
        descriptors: &[IndexDescriptor],
    ) -> Result<FindPlan> {
        let mut plan = match filter {
            Filter::Or(branches) => self.plan_or(filter, branches, descriptors)?,
            other => self.plan_conjunction(other, descriptors)?,
        };

        self.plan_sort(&mut plan, &options.sort);
        plan.collator = Some(
            options
                .collator
                .clone()
                .unwrap_or_else(|| self.collator.clone()),
        );
        plan.skip = options.skip;
        plan.limit = options.limit;

        debug!("plan for {filter}: {plan}");
        Ok(plan)
    }

    fn plan_or(
        &self,
        filter: &Filter,
        branches: &[Filter],
        descriptors: &[IndexDescriptor],
    ) -> Result<FindPlan> {
        let mut sub_plans = Vec::with_capacity(branches.len());
        for branch in branches {
            let sub = self.plan_conjunction(branch, descriptors)?;
            if sub.is_collection_scan() {
                debug!("branch {branch} needs a collection scan, scanning once for {filter}");
                return Ok(FindPlan {
                    residual_filter: Some(filter.clone()),
                    ..FindPlan::default()
                });
            }
            sub_plans.push(sub);
        }
        Ok(FindPlan {
            sub_plans,
            ..FindPlan::default()
        })
    }

    fn plan_conjunction(&self, filter: &Filter, descriptors: &[IndexDescriptor]) -> Result<FindPlan> {
        let terms = filter.conjuncts();

        if let Some(plan) = Self::plan_by_id(&terms) {
            return Ok(plan);
        }
        if let Some(plan) = Self::plan_text(&terms, descriptors)? {
            return Ok(plan);
        }
        if let Some(plan) = Self::plan_index_scan(&terms, descriptors) {
            return Ok(plan);
        }

        Ok(FindPlan {
            residual_filter: residual(terms.into_iter().cloned()),
            ..FindPlan::default()
        })
    }

    fn plan_by_id(terms: &[&Filter]) -> Option<FindPlan> {
        let (position, id) = terms.iter().enumerate().find_map(|(i, term)| match term {
            Filter::Compare(ComparisonFilter {
                field,
                condition: Condition::Eq(value),
            }) if field == ID_FIELD => Some((i, value.clone())),
            _ => None,
        })?;

        Some(FindPlan {
            by_id: Some(id),
            residual_filter: residual(
                terms
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != position)
                    .map(|(_, t)| (*t).clone()),
            ),
            ..FindPlan::default()
        })
    }

    /// Every text filter needs a full-text index on its field. The first one
    /// drives the scan, the others are evaluated on the results.
    fn plan_text(terms: &[&Filter], descriptors: &[IndexDescriptor]) -> Result<Option<FindPlan>> {
        let mut driver: Option<(usize, &IndexDescriptor, &ComparisonFilter)> = None;
        for (i, term) in terms.iter().enumerate() {
            let Some(comparison) = term.comparison().filter(|c| c.is_text()) else {
                continue;
            };
            let path = FieldPath::single(comparison.field.clone());
            let descriptor = descriptors
                .iter()
                .find(|d| d.is_full_text() && d.fields() == &path)
                .ok_or_else(|| {
                    CairnError::filter(format!(
                        "{} is not full-text indexed",
                        comparison.field
                    ))
                })?;
            if driver.is_none() {
                driver = Some((i, descriptor, comparison));
            }
        }

        Ok(driver.map(|(position, descriptor, comparison)| FindPlan {
            index_descriptor: Some(descriptor.clone()),
            index_scan_spec: Some(IndexScanSpec::new(vec![comparison.clone()])),
            residual_filter: residual(
                terms
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != position)
                    .map(|(_, t)| (*t).clone()),
            ),
            ..FindPlan::default()
        }))
    }

    fn plan_index_scan(terms: &[&Filter], descriptors: &[IndexDescriptor]) -> Option<FindPlan> {
        let comparisons: Vec<(usize, &ComparisonFilter)> = terms
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.comparison().filter(|c| !c.is_text()).map(|c| (i, c)))
            .collect();
        if comparisons.is_empty() {
            return None;
        }

        let mut best: Option<Candidate<'_>> = None;
        for descriptor in descriptors.iter().filter(|d| !d.is_full_text()) {
            let covered = descriptor
                .fields()
                .fields()
                .iter()
                .take_while(|f| comparisons.iter().any(|(_, c)| &c.field == *f))
                .count();
            if covered == 0 {
                continue;
            }
            let candidate = Candidate { descriptor, covered };
            if best.as_ref().is_none_or(|b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }
        let best = best?;

        let mut used = Vec::with_capacity(best.covered);
        let mut scan_filters = Vec::with_capacity(best.covered);
        for name in &best.descriptor.fields().fields()[..best.covered] {
            if let Some((i, c)) = comparisons.iter().find(|(_, c)| &c.field == name) {
                used.push(*i);
                scan_filters.push((*c).clone());
            }
        }

        Some(FindPlan {
            index_descriptor: Some(best.descriptor.clone()),
            index_scan_spec: Some(IndexScanSpec::new(scan_filters)),
            residual_filter: residual(
                terms
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !used.contains(i))
                    .map(|(_, t)| (*t).clone()),
            ),
            ..FindPlan::default()
        })
    }

    /// The index walk provides the order when the sort fields are a prefix of
    /// the scanned (non-text) index.
    fn plan_sort(&self, plan: &mut FindPlan, sort: &[(String, SortOrder)]) {
        if sort.is_empty() {
            return;
        }
        if let Some(descriptor) = &plan.index_descriptor {
            let fields = descriptor.fields().fields();
            let prefix = sort.len() <= fields.len()
                && sort.iter().zip(fields).all(|((name, _), field)| name == field);
            if !descriptor.is_full_text() && prefix {
                for (name, order) in sort {
                    plan.index_scan_order
                        .insert(name.clone(), order.is_descending());
                }
                return;
            }
        }
        plan.blocking_sort = sort.to_vec();
    }
}
