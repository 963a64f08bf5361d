//! Lazy record streams.
//!
//! A find call assembles a chain of iterator stages over
//! `(RecordId, Arc<Document>)` pairs:
//!
//! ```text
//! source     ById | Indexed | MapEntries (collection scan)
//!   └─ Union + Distinct       (OR sub-plans)
//!      └─ Filtered            (residual filter)
//!         └─ Sorted           (blocking sort)
//!            └─ Bounded       (skip / limit)
//!               └─ DocumentCursor ─┬─ ProjectedCursor
//!                                  └─ JoinedCursor
//! ```
//!
//! Stored documents are shared until the cursor hands them out; only the
//! cursor clones them and runs the post-read processors. An `Err` item ends
//! the stage that produced it.

pub mod bounded;
pub mod cursor;
pub mod join;
pub mod project;
pub mod sorted;
pub mod source;

use std::sync::Arc;

use crate::data::Document;
use crate::error::Result;
use crate::index::operations::IndexOperations;
use crate::query::plan::FindPlan;
use crate::store::{MapEntries, RecordMap};
use crate::util::id::RecordId;

pub use self::bounded::BoundedStream;
pub use self::cursor::DocumentCursor;
pub use self::join::{JoinedCursor, Lookup};
pub use self::project::ProjectedCursor;
pub use self::sorted::SortedStream;
pub use self::source::{ByIdStream, DistinctStream, FilteredStream, IndexedStream, UnionStream};

pub type RecordEntry = (RecordId, Arc<Document>);

/// A boxed stage of the pipeline.
pub type RecordStream = Box<dyn Iterator<Item = Result<RecordEntry>> + Send>;

/// Assemble the stages for `plan`, up to and including skip/limit.
pub fn build_stream(
    plan: &FindPlan,
    records: &RecordMap,
    indexes: &IndexOperations,
) -> Result<RecordStream> {
    let mut stream = source_stream(plan, records, indexes)?;

    if let Some(filter) = &plan.residual_filter {
        stream = Box::new(FilteredStream::new(stream, filter.clone()));
    }
    if !plan.blocking_sort.is_empty() {
        stream = Box::new(SortedStream::new(
            stream,
            plan.blocking_sort.clone(),
            plan.collator.clone(),
        ));
    }
    if plan.skip.is_some() || plan.limit.is_some() {
        stream = Box::new(BoundedStream::new(stream, plan.skip, plan.limit)?);
    }
    Ok(stream)
}

fn source_stream(
    plan: &FindPlan,
    records: &RecordMap,
    indexes: &IndexOperations,
) -> Result<RecordStream> {
    if !plan.sub_plans.is_empty() {
        let branches = plan
            .sub_plans
            .iter()
            .map(|sub| build_stream(sub, records, indexes))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Box::new(DistinctStream::new(UnionStream::new(branches))));
    }
    if let Some(id) = &plan.by_id {
        return Ok(Box::new(ByIdStream::new(id, records.clone())));
    }
    if let Some(descriptor) = &plan.index_descriptor {
        let ids = indexes.index_store(descriptor)?.scan(plan)?;
        return Ok(Box::new(IndexedStream::new(ids.into_vec(), records.clone())));
    }
    Ok(Box::new(MapEntries::new(records.clone())))
}
