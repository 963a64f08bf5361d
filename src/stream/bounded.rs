use crate::error::{CairnError, Result};
use crate::stream::RecordEntry;

/// Skips the first `skip` records and yields at most `limit` after that.
pub struct BoundedStream<I> {
    inner: I,
    skip: usize,
    remaining: Option<usize>,
}

fn checked(name: &str, value: Option<i64>) -> Result<Option<usize>> {
    match value {
        Some(v) if v < 0 => Err(CairnError::validation(format!(
            "{name} must not be negative, got {v}"
        ))),
        Some(v) => Ok(Some(usize::try_from(v).unwrap_or(usize::MAX))),
        None => Ok(None),
    }
}

impl<I> BoundedStream<I> {
    pub fn new(inner: I, skip: Option<i64>, limit: Option<i64>) -> Result<Self> {
        Ok(Self {
            inner,
            skip: checked("skip", skip)?.unwrap_or(0),
            remaining: checked("limit", limit)?,
        })
    }
}

impl<I: Iterator<Item = Result<RecordEntry>>> Iterator for BoundedStream<I> {
    type Item = Result<RecordEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        while self.skip > 0 {
            self.skip -= 1;
            match self.inner.next()? {
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        let item = self.inner.next()?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::Document;
    use crate::util::id::RecordId;

    fn numbers(n: u64) -> impl Iterator<Item = Result<RecordEntry>> {
        (1..=n).map(|i| Ok((RecordId::new(i), Arc::new(Document::new()))))
    }

    fn ids(stream: BoundedStream<impl Iterator<Item = Result<RecordEntry>>>) -> Vec<u64> {
        stream.map(|entry| entry.unwrap().0.value()).collect()
    }

    #[test]
    fn test_skip_and_limit() {
        assert_eq!(ids(BoundedStream::new(numbers(10), Some(2), Some(3)).unwrap()), vec![3, 4, 5]);
        assert!(ids(BoundedStream::new(numbers(4), Some(10), None).unwrap()).is_empty());
        assert!(ids(BoundedStream::new(numbers(4), None, Some(0)).unwrap()).is_empty());
        assert_eq!(ids(BoundedStream::new(numbers(4), None, Some(10)).unwrap()).len(), 4);
    }

    #[test]
    fn test_negative_is_rejected() {
        let err = BoundedStream::new(numbers(1), Some(-1), None).err().unwrap();
        assert!(matches!(err, CairnError::Validation(_)));
        assert!(BoundedStream::new(numbers(1), None, Some(-5)).is_err());
    }
}
