use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::index::key::{DocumentFieldExtractor, FieldExtractor};
use crate::index::tokenizer::{StopWordTokenizer, TextTokenizer};
use crate::query::options::{BinaryCollator, Collator};

/// Configuration of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Rebuild a dirty, idle index when a write reaches it instead of
    /// writing into stale content.
    #[serde(default = "default_true")]
    pub rebuild_dirty_on_write: bool,
    /// Drop indexes on the rayon pool in `drop_all_indices`.
    #[serde(default = "default_true")]
    pub parallel_index_drop: bool,
    /// Node id for record id generation. Random when unset.
    #[serde(default)]
    pub node_id: Option<u16>,
    /// Stop words for full-text indexes. English when unset.
    #[serde(default)]
    pub stop_words: Option<Vec<String>>,
    /// Tokenizer for full-text indexes; overrides `stop_words`.
    #[serde(skip)]
    pub tokenizer: Option<Arc<dyn TextTokenizer>>,
    /// Default collator for sorts that do not set one.
    #[serde(skip)]
    pub collator: Option<Arc<dyn Collator>>,
    #[serde(skip)]
    pub field_extractor: Option<Arc<dyn FieldExtractor>>,
}

fn default_true() -> bool {
    true
}

impl CollectionConfig {
    pub fn new() -> Self {
        Self {
            rebuild_dirty_on_write: true,
            parallel_index_drop: true,
            node_id: None,
            stop_words: None,
            tokenizer: None,
            collator: None,
            field_extractor: None,
        }
    }

    pub fn builder() -> CollectionConfigBuilder {
        CollectionConfigBuilder::default()
    }

    pub fn tokenizer(&self) -> Arc<dyn TextTokenizer> {
        if let Some(tokenizer) = &self.tokenizer {
            return tokenizer.clone();
        }
        match &self.stop_words {
            Some(words) => Arc::new(StopWordTokenizer::new(words)),
            None => Arc::new(StopWordTokenizer::english()),
        }
    }

    pub fn collator(&self) -> Arc<dyn Collator> {
        self.collator
            .clone()
            .unwrap_or_else(|| Arc::new(BinaryCollator))
    }

    pub fn field_extractor(&self) -> Arc<dyn FieldExtractor> {
        self.field_extractor
            .clone()
            .unwrap_or_else(|| Arc::new(DocumentFieldExtractor))
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct CollectionConfigBuilder {
    config: Option<CollectionConfig>,
}

impl CollectionConfigBuilder {
    fn config(&mut self) -> &mut CollectionConfig {
        self.config.get_or_insert_with(CollectionConfig::new)
    }

    pub fn rebuild_dirty_on_write(mut self, enabled: bool) -> Self {
        self.config().rebuild_dirty_on_write = enabled;
        self
    }

    pub fn parallel_index_drop(mut self, enabled: bool) -> Self {
        self.config().parallel_index_drop = enabled;
        self
    }

    pub fn node_id(mut self, node_id: u16) -> Self {
        self.config().node_id = Some(node_id);
        self
    }

    pub fn stop_words<S: Into<String>>(mut self, words: impl IntoIterator<Item = S>) -> Self {
        self.config().stop_words = Some(words.into_iter().map(Into::into).collect());
        self
    }

    pub fn tokenizer(mut self, tokenizer: Arc<dyn TextTokenizer>) -> Self {
        self.config().tokenizer = Some(tokenizer);
        self
    }

    pub fn collator(mut self, collator: Arc<dyn Collator>) -> Self {
        self.config().collator = Some(collator);
        self
    }

    pub fn field_extractor(mut self, extractor: Arc<dyn FieldExtractor>) -> Self {
        self.config().field_extractor = Some(extractor);
        self
    }

    pub fn build(self) -> CollectionConfig {
        self.config.unwrap_or_default()
    }
}
