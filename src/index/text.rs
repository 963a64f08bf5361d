//! Full-text index: token -> record ids.
//!
//! Queries are either plain words, scored by how many query tokens a record
//! contains, or a single token with wildcards:
//!
//! - `term*` matches tokens starting with `term`
//! - `*term` matches tokens ending with `term`
//! - `*term*` matches tokens containing `term`

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::data::Value;
use crate::error::{CairnError, Result};
use crate::index::IndexStore;
use crate::index::descriptor::IndexDescriptor;
use crate::index::key::FieldValues;
use crate::index::node::RecordIdSet;
use crate::index::tokenizer::TextTokenizer;
use crate::query::filter::Condition;
use crate::query::plan::FindPlan;
use crate::store::{KeyValueStore, MapEntries, TextMap};
use crate::util::id::RecordId;

#[derive(Debug)]
pub struct TextIndex {
    descriptor: IndexDescriptor,
    map_name: String,
    store: Arc<dyn KeyValueStore>,
    map: TextMap,
    tokenizer: Arc<dyn TextTokenizer>,
    write_lock: Mutex<()>,
}

/// Parsed form of a text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextQuery {
    Words(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl TextQuery {
    pub fn parse(query: &str) -> Result<Self> {
        let query = query.trim();
        if !query.contains('*') {
            return Ok(TextQuery::Words(query.to_string()));
        }
        if query.chars().all(|c| c == '*') {
            return Err(CairnError::filter("'*' is not a valid text search term"));
        }
        if query.split_whitespace().count() > 1 {
            return Err(CairnError::filter(format!(
                "wildcard query '{query}' must be a single term"
            )));
        }

        let leading = query.starts_with('*');
        let trailing = query.ends_with('*');
        let term = query.trim_matches('*').to_lowercase();
        if term.contains('*') {
            return Err(CairnError::filter(format!(
                "wildcard in '{query}' is only supported at the start or end"
            )));
        }
        Ok(match (leading, trailing) {
            (true, true) => TextQuery::Contains(term),
            (true, false) => TextQuery::Suffix(term),
            _ => TextQuery::Prefix(term),
        })
    }
}

impl TextIndex {
    pub fn new(
        descriptor: IndexDescriptor,
        map_name: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        tokenizer: Arc<dyn TextTokenizer>,
    ) -> Result<Self> {
        let map_name = map_name.into();
        let map = store.open_text_map(&map_name)?;
        Ok(Self {
            descriptor,
            map_name,
            store,
            map,
            tokenizer,
            write_lock: Mutex::new(()),
        })
    }

    fn tokens(&self, value: &Value) -> Result<Vec<String>> {
        let field = self.descriptor.fields().first();
        let mut tokens = Vec::new();
        let mut add = |text: &str| {
            for token in self.tokenizer.tokenize(text) {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        };
        match value {
            Value::Null => {}
            Value::String(text) => add(text.as_str()),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(text) => add(text.as_str()),
                        Value::Null => {}
                        other => {
                            return Err(CairnError::indexing(format!(
                                "full-text index on '{field}' cannot index a {} element",
                                other.type_name()
                            )));
                        }
                    }
                }
            }
            other => {
                return Err(CairnError::indexing(format!(
                    "full-text index on '{field}' requires string values, found {}",
                    other.type_name()
                )));
            }
        }
        Ok(tokens)
    }

    /// Run a text query against the index.
    pub fn search(&self, query: &str) -> Result<RecordIdSet> {
        let map = &self.map;
        match TextQuery::parse(query)? {
            TextQuery::Words(words) => self.search_words(&map, &words),
            TextQuery::Prefix(term) => {
                let mut results = RecordIdSet::new();
                let mut current = map.ceiling_key(&term)?;
                while let Some(token) = current {
                    if !token.starts_with(&term) {
                        break;
                    }
                    if let Some(ids) = map.get(&token)? {
                        results.extend(&ids);
                    }
                    current = map.higher_key(&token)?;
                }
                Ok(results)
            }
            TextQuery::Suffix(term) => Self::walk_matching(&map, |t| t.ends_with(&term)),
            TextQuery::Contains(term) => Self::walk_matching(&map, |t| t.contains(&term)),
        }
    }

    fn walk_matching(map: &TextMap, accept: impl Fn(&str) -> bool) -> Result<RecordIdSet> {
        let mut results = RecordIdSet::new();
        for entry in MapEntries::new(map.clone()) {
            let (token, ids) = entry?;
            if accept(&token) {
                results.extend(&ids);
            }
        }
        Ok(results)
    }

    /// Records containing any query token, best-scoring first. Ties keep
    /// first-seen order.
    fn search_words(&self, map: &TextMap, words: &str) -> Result<RecordIdSet> {
        let mut scores: Vec<(RecordId, usize)> = Vec::new();
        let mut positions: AHashMap<RecordId, usize> = AHashMap::new();
        for token in self.tokenizer.tokenize(words) {
            let Some(ids) = map.get(&token)? else { continue };
            for id in ids {
                match positions.get(&id) {
                    Some(&pos) => scores[pos].1 += 1,
                    None => {
                        positions.insert(id, scores.len());
                        scores.push((id, 1));
                    }
                }
            }
        }
        scores.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(scores.into_iter().map(|(id, _)| id).collect())
    }
}

impl IndexStore for TextIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    fn write(&self, values: &FieldValues) -> Result<()> {
        let tokens = self.tokens(values.first_value())?;
        let _guard = self.write_lock.lock();
        let map = &self.map;
        for token in tokens {
            let mut ids = map.get(&token)?.unwrap_or_default();
            if !ids.contains(&values.id) {
                ids.push(values.id);
                map.put(token, ids)?;
            }
        }
        Ok(())
    }

    fn remove(&self, values: &FieldValues) -> Result<()> {
        let tokens = self.tokens(values.first_value())?;
        let _guard = self.write_lock.lock();
        let map = &self.map;
        for token in tokens {
            let Some(mut ids) = map.get(&token)? else { continue };
            ids.retain(|id| *id != values.id);
            if ids.is_empty() {
                map.remove(&token)?;
            } else {
                map.put(token, ids)?;
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.map.clear()
    }

    fn drop_index(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.store.drop_map(&self.map_name)
    }

    fn scan(&self, plan: &FindPlan) -> Result<RecordIdSet> {
        match plan.scan_filters() {
            [filter] => match &filter.condition {
                Condition::Text(query) => self.search(query),
                _ => Err(CairnError::filter(format!(
                    "full-text index on '{}' only answers text filters",
                    filter.field
                ))),
            },
            filters => Err(CairnError::filter(format!(
                "full-text index scan expects one text filter, got {}",
                filters.len()
            ))),
        }
    }
}
