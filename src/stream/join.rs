use crate::data::{Document, Value};
use crate::error::Result;
use crate::query::filter::values_equal;
use crate::stream::DocumentCursor;

/// Field pair of a join and where to put the matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub local_field: String,
    pub foreign_field: String,
    pub target_field: String,
}

impl Lookup {
    pub fn new(
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            target_field: target_field.into(),
        }
    }
}

/// Nested-loop left outer join.
///
/// For every local document, the foreign documents whose `foreign_field`
/// equals its `local_field` are stored as an array under `target_field`.
/// Local documents without a value or without matches pass through unchanged.
pub struct JoinedCursor {
    inner: DocumentCursor,
    foreign: Option<DocumentCursor>,
    foreign_docs: Vec<Document>,
    lookup: Lookup,
    finished: bool,
}

impl JoinedCursor {
    pub fn new(inner: DocumentCursor, foreign: DocumentCursor, lookup: Lookup) -> Self {
        Self {
            inner,
            foreign: Some(foreign),
            foreign_docs: Vec::new(),
            lookup,
            finished: false,
        }
    }

    pub fn to_vec(self) -> Result<Vec<Document>> {
        self.collect()
    }

    fn join(&self, mut document: Document) -> Document {
        let local = match document.get_path(&self.lookup.local_field) {
            None | Some(Value::Null) => return document,
            Some(value) => value,
        };

        let mut matches: Vec<Value> = Vec::new();
        for foreign in &self.foreign_docs {
            let Some(value) = foreign.get_path(&self.lookup.foreign_field) else { continue };
            if value.is_null() || !values_equal(&value, &local) {
                continue;
            }
            let candidate = Value::Document(foreign.clone());
            if !matches.contains(&candidate) {
                matches.push(candidate);
            }
        }
        if !matches.is_empty() {
            document.put(self.lookup.target_field.clone(), Value::Array(matches));
        }
        document
    }
}

impl Iterator for JoinedCursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Some(foreign) = self.foreign.take() {
            match foreign.to_vec() {
                Ok(docs) => self.foreign_docs = docs,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        match self.inner.next()? {
            Ok(document) => Some(Ok(self.join(document))),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::processor::ProcessorChain;
    use crate::stream::RecordEntry;
    use crate::util::id::RecordId;

    fn cursor(docs: Vec<Document>) -> DocumentCursor {
        let entries: Vec<Result<RecordEntry>> = docs
            .into_iter()
            .enumerate()
            .map(|(i, doc)| Ok((RecordId::new(i as u64), Arc::new(doc))))
            .collect();
        DocumentCursor::new(Box::new(entries.into_iter()), ProcessorChain::new())
    }

    #[test]
    fn test_left_outer_join() {
        let users = cursor(vec![
            Document::new().add_field("name", "ada").add_field("team", 1),
            Document::new().add_field("name", "bob").add_field("team", 2),
            Document::new().add_field("name", "cy"),
        ]);
        let teams = cursor(vec![
            Document::new().add_field("id", 1).add_field("label", "core"),
            Document::new().add_field("id", 1.0).add_field("label", "core"),
            Document::new().add_field("id", 3).add_field("label", "ops"),
        ]);

        let joined = users
            .join(teams, Lookup::new("team", "id", "teams"))
            .to_vec()
            .unwrap();

        let teams = joined[0].get("teams").and_then(Value::as_array).unwrap();
        assert_eq!(teams.len(), 2);
        assert!(!joined[1].has_field("teams"));
        assert!(!joined[2].has_field("teams"));
    }
}
