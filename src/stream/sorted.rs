use std::cmp::Ordering;
use std::sync::Arc;

use crate::data::Value;
use crate::error::{CairnError, Result};
use crate::index::key::compare_scalars;
use crate::query::options::{BinaryCollator, Collator, SortOrder};
use crate::stream::{RecordEntry, RecordStream};

/// Blocking sort. The input is drained on the first pull and sorted stably;
/// missing and null values sort lowest.
pub struct SortedStream {
    inner: Option<RecordStream>,
    keys: Vec<(String, SortOrder)>,
    collator: Arc<dyn Collator>,
    sorted: std::vec::IntoIter<RecordEntry>,
}

impl SortedStream {
    pub fn new(
        inner: RecordStream,
        keys: Vec<(String, SortOrder)>,
        collator: Option<Arc<dyn Collator>>,
    ) -> Self {
        Self {
            inner: Some(inner),
            keys,
            collator: collator.unwrap_or_else(|| Arc::new(BinaryCollator)),
            sorted: Vec::new().into_iter(),
        }
    }

    fn sort_values(&self, entry: &RecordEntry) -> Result<Vec<Value>> {
        self.keys
            .iter()
            .map(|(field, _)| {
                let value = entry.1.get_path(field).unwrap_or(Value::Null);
                if matches!(value, Value::Array(_) | Value::Document(_)) {
                    return Err(CairnError::validation(format!(
                        "cannot sort on {} value of field '{field}'",
                        value.type_name()
                    )));
                }
                Ok(value)
            })
            .collect()
    }

    fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((left, right), (_, order)) in a.iter().zip(b).zip(&self.keys) {
            let ordering = compare_sort_values(left, right, self.collator.as_ref());
            let ordering = if order.is_descending() {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn materialize(&mut self, inner: RecordStream) -> Result<()> {
        let mut rows = Vec::new();
        for entry in inner {
            let entry = entry?;
            let values = self.sort_values(&entry)?;
            rows.push((values, entry));
        }
        rows.sort_by(|(a, _), (b, _)| self.compare(a, b));
        self.sorted = rows
            .into_iter()
            .map(|(_, entry)| entry)
            .collect::<Vec<_>>()
            .into_iter();
        Ok(())
    }
}

/// Null lowest, then by type class, strings through the collator.
fn compare_sort_values(a: &Value, b: &Value, collator: &dyn Collator) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::String(x), Value::String(y)) => collator.compare(x, y),
        _ => compare_scalars(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b))),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int64(_) | Value::Float64(_) => 2,
        Value::String(_) => 3,
        Value::DateTime(_) => 4,
        Value::Array(_) => 5,
        Value::Document(_) => 6,
    }
}

impl Iterator for SortedStream {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(inner) = self.inner.take() {
            if let Err(e) = self.materialize(inner) {
                return Some(Err(e));
            }
        }
        self.sorted.next().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Document;
    use crate::query::options::UnicodeCollator;
    use crate::util::id::RecordId;

    fn stream(docs: Vec<Document>) -> RecordStream {
        let entries: Vec<Result<RecordEntry>> = docs
            .into_iter()
            .enumerate()
            .map(|(i, doc)| Ok((RecordId::new(i as u64 + 1), Arc::new(doc))))
            .collect();
        Box::new(entries.into_iter())
    }

    fn ids(sorted: SortedStream) -> Vec<u64> {
        sorted.map(|entry| entry.unwrap().0.value()).collect()
    }

    #[test]
    fn test_nulls_first_and_stable() {
        let docs = vec![
            Document::new().add_field("n", 2),
            Document::new(),
            Document::new().add_field("n", 1.5),
            Document::new().add_field("n", Value::Null),
            Document::new().add_field("n", 2),
        ];
        let asc = SortedStream::new(stream(docs.clone()), vec![("n".into(), SortOrder::Ascending)], None);
        assert_eq!(ids(asc), vec![2, 4, 3, 1, 5]);

        let desc = SortedStream::new(stream(docs), vec![("n".into(), SortOrder::Descending)], None);
        assert_eq!(ids(desc), vec![1, 5, 3, 2, 4]);
    }

    #[test]
    fn test_multiple_keys_and_collator() {
        let docs = vec![
            Document::new().add_field("city", "b").add_field("name", "Émile"),
            Document::new().add_field("city", "a").add_field("name", "zoe"),
            Document::new().add_field("city", "b").add_field("name", "anna"),
            Document::new().add_field("city", "b").add_field("name", "Fred"),
        ];
        let keys = vec![
            ("city".to_string(), SortOrder::Ascending),
            ("name".to_string(), SortOrder::Ascending),
        ];
        let binary = SortedStream::new(stream(docs.clone()), keys.clone(), None);
        assert_eq!(ids(binary), vec![2, 4, 3, 1]);

        let unicode = SortedStream::new(stream(docs), keys, Some(Arc::new(UnicodeCollator)));
        assert_eq!(ids(unicode), vec![2, 3, 1, 4]);
    }

    #[test]
    fn test_array_sort_value_is_error() {
        let docs = vec![Document::new().add_field("n", vec![1, 2])];
        let mut sorted = SortedStream::new(stream(docs), vec![("n".into(), SortOrder::Ascending)], None);
        assert!(matches!(sorted.next(), Some(Err(CairnError::Validation(_)))));
        assert!(sorted.next().is_none());
    }
}
