//! # Cairn
//!
//! Indexing and query core of an embedded document database.
//!
//! ## Features
//!
//! - Unique, non-unique and compound indexes over ordered key-value maps
//! - Full-text indexes with word scoring and wildcard terms
//! - A find optimizer choosing id lookups, index scans or collection scans
//! - Lazy cursors with filtering, sorting, pagination, projection and joins
//!
//! ```
//! use cairn::{Collection, Document, IndexKind, field};
//!
//! # fn main() -> cairn::Result<()> {
//! let people = Collection::in_memory("people")?;
//! people.create_index("age".into(), IndexKind::NonUnique)?;
//! people.insert(Document::new().add_field("name", "ada").add_field("age", 36))?;
//!
//! let adults = people.find(&field("age").gte(18))?.to_vec()?;
//! assert_eq!(adults.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod config;
pub mod data;
pub mod error;
pub mod event;
pub mod index;
pub mod processor;
pub mod query;
pub mod store;
pub mod stream;
pub mod util;

// Re-exports for the public API
pub use collection::Collection;
pub use config::CollectionConfig;
pub use data::{Document, Value};
pub use error::{CairnError, Result};
pub use event::{IndexEvent, IndexEventListener};
pub use index::descriptor::{IndexDescriptor, IndexKind};
pub use index::key::FieldPath;
pub use processor::Processor;
pub use query::filter::{Filter, field};
pub use query::options::{FindOptions, SortOrder, UnicodeCollator};
pub use store::{KeyValueStore, MemoryStore};
pub use stream::{DocumentCursor, Lookup};
pub use util::id::RecordId;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
