//! Find options: sort order, pagination and string collation.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn is_descending(&self) -> bool {
        *self == SortOrder::Descending
    }
}

/// Orders strings during a blocking sort.
pub trait Collator: Send + Sync + fmt::Debug {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Plain code-point order.
#[derive(Debug, Default, Clone)]
pub struct BinaryCollator;

impl Collator for BinaryCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Locale-neutral collation: compares strings after compatibility
/// decomposition, with diacritics removed and case folded. Strings that are
/// equal under that key fall back to code-point order.
#[derive(Debug, Default, Clone)]
pub struct UnicodeCollator;

impl UnicodeCollator {
    fn key(text: &str) -> String {
        text.nfkd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect()
    }
}

impl Collator for UnicodeCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        Self::key(a).cmp(&Self::key(b)).then_with(|| a.cmp(b))
    }
}

/// Options of a find call.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub collator: Option<Arc<dyn Collator>>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sort key; earlier keys take precedence.
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collator(mut self, collator: Arc<dyn Collator>) -> Self {
        self.collator = Some(collator);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicode_collator() {
        let collator = UnicodeCollator;
        assert_eq!(collator.compare("élan", "elk"), Ordering::Less);
        assert_eq!(collator.compare("Zebra", "apple"), Ordering::Greater);
        assert_eq!(collator.compare("abc", "abc"), Ordering::Equal);
        assert_ne!(collator.compare("Abc", "abc"), Ordering::Equal);

        assert_eq!(BinaryCollator.compare("Zebra", "apple"), Ordering::Less);
    }

    #[test]
    fn test_options_builder() {
        let options = FindOptions::new()
            .sort_by("age", SortOrder::Descending)
            .sort_by("name", SortOrder::Ascending)
            .skip(2)
            .limit(3);
        assert_eq!(options.sort.len(), 2);
        assert!(options.sort[0].1.is_descending());
        assert_eq!(options.skip, Some(2));
        assert_eq!(options.limit, Some(3));
    }
}
