use crate::data::Document;
use crate::error::Result;
use crate::processor::ProcessorChain;
use crate::stream::{JoinedCursor, Lookup, ProjectedCursor, RecordStream};

/// Result cursor of a find call.
///
/// Each pulled record is cloned out of the store and passed through the
/// post-read processors. The cursor ends after the first error.
pub struct DocumentCursor {
    stream: RecordStream,
    processors: ProcessorChain,
    finished: bool,
}

impl DocumentCursor {
    pub fn new(stream: RecordStream, processors: ProcessorChain) -> Self {
        Self {
            stream,
            processors,
            finished: false,
        }
    }

    /// Keep only the fields named by `projection`. Values of the projection
    /// must be null, or documents that project a nested document.
    pub fn project(self, projection: Document) -> Result<ProjectedCursor> {
        ProjectedCursor::new(self, projection)
    }

    /// Left outer join against `foreign`, which is read once on first use.
    pub fn join(self, foreign: DocumentCursor, lookup: Lookup) -> JoinedCursor {
        JoinedCursor::new(self, foreign, lookup)
    }

    pub fn to_vec(self) -> Result<Vec<Document>> {
        self.collect()
    }

    pub fn first(mut self) -> Result<Option<Document>> {
        self.next().transpose()
    }
}

impl Iterator for DocumentCursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = match self.stream.next()? {
            Ok((_, document)) => self
                .processors
                .process_after_read(Document::clone(&document)),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::Value;
    use crate::error::CairnError;
    use crate::processor::Processor;
    use crate::stream::RecordEntry;
    use crate::util::id::RecordId;

    #[derive(Debug)]
    struct Redact;

    impl Processor for Redact {
        fn process_after_read(&self, mut document: Document) -> Result<Document> {
            document.put("secret", "***");
            Ok(document)
        }
    }

    fn stream(items: Vec<Result<RecordEntry>>) -> RecordStream {
        Box::new(items.into_iter())
    }

    #[test]
    fn test_processors_run_on_a_copy() {
        let stored = Arc::new(Document::new().add_field("secret", "s3cr3t"));
        let mut chain = ProcessorChain::new();
        chain.add(Arc::new(Redact));

        let cursor = DocumentCursor::new(stream(vec![Ok((RecordId::new(1), stored.clone()))]), chain);
        let docs = cursor.to_vec().unwrap();
        assert_eq!(docs[0].get("secret"), Some(&Value::from("***")));
        assert_eq!(stored.get("secret"), Some(&Value::from("s3cr3t")));
    }

    #[test]
    fn test_error_ends_cursor() {
        let items = vec![
            Err(CairnError::storage("boom")),
            Ok((RecordId::new(1), Arc::new(Document::new()))),
        ];
        let mut cursor = DocumentCursor::new(stream(items), ProcessorChain::new());
        assert!(cursor.next().unwrap().is_err());
        assert!(cursor.next().is_none());
    }
}
