use crate::data::{Document, Value};
use crate::error::{CairnError, Result};
use crate::stream::DocumentCursor;

/// Documents reduced to the fields of a projection document.
///
/// A `null` projection value keeps the field as is. A document value keeps
/// the field and, when the field holds a document, projects it recursively.
/// Fields missing from a record are not added.
pub struct ProjectedCursor {
    inner: DocumentCursor,
    projection: Document,
}

fn validate(projection: &Document, prefix: &str) -> Result<()> {
    for (name, value) in projection.iter() {
        match value {
            Value::Null => {}
            Value::Document(nested) => validate(nested, &format!("{prefix}{name}."))?,
            other => {
                return Err(CairnError::validation(format!(
                    "projection of '{prefix}{name}' must be null or a document, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(())
}

fn project(document: &Document, projection: &Document) -> Document {
    let mut result = Document::new();
    for (name, spec) in projection.iter() {
        let Some(value) = document.get(name) else { continue };
        let projected = match (spec, value) {
            (Value::Document(nested), Value::Document(inner)) => {
                Value::Document(project(inner, nested))
            }
            _ => value.clone(),
        };
        result.put(name.clone(), projected);
    }
    result
}

impl ProjectedCursor {
    pub fn new(inner: DocumentCursor, projection: Document) -> Result<Self> {
        validate(&projection, "")?;
        Ok(Self { inner, projection })
    }

    pub fn to_vec(self) -> Result<Vec<Document>> {
        self.collect()
    }
}

impl Iterator for ProjectedCursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = self.inner.next()?;
        Some(document.map(|doc| project(&doc, &self.projection)))
    }
}
