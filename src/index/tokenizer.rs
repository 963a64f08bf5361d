//! Tokenizers used by full-text indexes.

use std::fmt;

use ahash::AHashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Splits text into the tokens stored in a full-text index.
///
/// Implementations must be deterministic: the same text always yields the
/// same tokens, since removal re-tokenizes the stored value.
pub trait TextTokenizer: Send + Sync + fmt::Debug {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Unicode word segmentation with lower-casing and stop-word removal.
/// Each token appears once, in first-occurrence order.
#[derive(Debug, Clone)]
pub struct StopWordTokenizer {
    stop_words: AHashSet<String>,
}

impl StopWordTokenizer {
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_words: stop_words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn english() -> Self {
        Self::new(ENGLISH_STOP_WORDS.iter().copied())
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }
}

impl Default for StopWordTokenizer {
    fn default() -> Self {
        Self::english()
    }
}

impl TextTokenizer for StopWordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut seen = AHashSet::new();
        let mut tokens = Vec::new();
        for word in text.unicode_words() {
            let token = word.to_lowercase();
            if self.is_stop_word(&token) {
                continue;
            }
            if seen.insert(token.clone()) {
                tokens.push(token);
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_tokenizer() {
        let tokenizer = StopWordTokenizer::english();
        assert_eq!(
            tokenizer.tokenize("The quick fox, the QUICK dog!"),
            vec!["quick", "fox", "dog"]
        );
        assert!(tokenizer.tokenize("the and of").is_empty());
    }

    #[test]
    fn test_custom_stop_words() {
        let tokenizer = StopWordTokenizer::new(["Le", "la"]);
        assert_eq!(tokenizer.tokenize("le renard et la forêt"), vec!["renard", "et", "forêt"]);
    }
}
