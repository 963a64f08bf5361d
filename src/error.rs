//! Error types for the indexing and query core.

use thiserror::Error;

/// The error type shared by every cairn operation.
#[derive(Debug, Error)]
pub enum CairnError {
    /// Index lifecycle or index maintenance failure.
    #[error("Indexing error: {0}")]
    Indexing(String),

    /// Invalid input such as a negative limit or a malformed projection.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A unique index already holds a different record under the same key.
    #[error("Unique constraint violation: {0}")]
    UniqueConstraint(String),

    /// A filter could not be planned or evaluated.
    #[error("Filter error: {0}")]
    Filter(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Failure reported by the key-value store.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CairnError {
    pub fn indexing(msg: impl Into<String>) -> Self {
        CairnError::Indexing(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CairnError::Validation(msg.into())
    }

    pub fn unique_constraint(msg: impl Into<String>) -> Self {
        CairnError::UniqueConstraint(msg.into())
    }

    pub fn filter(msg: impl Into<String>) -> Self {
        CairnError::Filter(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        CairnError::InvalidOperation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        CairnError::InvalidId(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        CairnError::Storage(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CairnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CairnError::indexing("indexing is already running on [name]");
        assert_eq!(
            err.to_string(),
            "Indexing error: indexing is already running on [name]"
        );
        assert!(matches!(
            CairnError::validation("x"),
            CairnError::Validation(_)
        ));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: CairnError = parse.unwrap_err().into();
        assert!(matches!(err, CairnError::Json(_)));
    }
}
