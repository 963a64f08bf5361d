//! Document processors applied before writes and after reads.

use std::fmt;
use std::sync::Arc;

use crate::data::Document;
use crate::error::Result;

/// Transforms documents on their way into and out of a collection,
/// e.g. to encrypt a field at rest.
pub trait Processor: Send + Sync + fmt::Debug {
    fn process_before_write(&self, document: Document) -> Result<Document> {
        Ok(document)
    }

    fn process_after_read(&self, document: Document) -> Result<Document> {
        Ok(document)
    }
}

/// Ordered list of processors. Reads run them in reverse order so that a
/// read undoes the writes' transformations.
#[derive(Debug, Clone, Default)]
pub struct ProcessorChain {
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, processor: Arc<dyn Processor>) {
        self.processors.push(processor);
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn process_before_write(&self, document: Document) -> Result<Document> {
        self.processors
            .iter()
            .try_fold(document, |doc, p| p.process_before_write(doc))
    }

    pub fn process_after_read(&self, document: Document) -> Result<Document> {
        self.processors
            .iter()
            .rev()
            .try_fold(document, |doc, p| p.process_after_read(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    #[derive(Debug)]
    struct Suffix(&'static str);

    impl Processor for Suffix {
        fn process_before_write(&self, mut document: Document) -> Result<Document> {
            let name = document.get("name").and_then(Value::as_str).unwrap_or("").to_string();
            document.put("name", format!("{name}{}", self.0));
            Ok(document)
        }

        fn process_after_read(&self, mut document: Document) -> Result<Document> {
            let name = document.get("name").and_then(Value::as_str).unwrap_or("").to_string();
            document.put("name", name.trim_end_matches(self.0).to_string());
            Ok(document)
        }
    }

    #[test]
    fn test_chain_order() {
        let mut chain = ProcessorChain::new();
        chain.add(Arc::new(Suffix("-a")));
        chain.add(Arc::new(Suffix("-b")));

        let written = chain
            .process_before_write(Document::new().add_field("name", "x"))
            .unwrap();
        assert_eq!(written.get("name"), Some(&Value::from("x-a-b")));

        let read = chain.process_after_read(written).unwrap();
        assert_eq!(read.get("name"), Some(&Value::from("x")));
    }
}
