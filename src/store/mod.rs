//! Versioned document store: row keys, shared types and the operations that tie the
//! blob store, the table store and the search index together.

pub mod correlation;
pub mod keys;
pub mod locks;
pub mod ops;
pub mod types;

pub use correlation::CorrelationId;
pub use keys::{clean_name, name_filter_regex, normalize_name, validate_name, RowKey, RowKeyError};
pub use ops::{DocumentStore, StoreOptions};
pub use types::{
    ContentPlacement, Metadata, Retrieved, Row, RowFilter, SearchResponse, StoredVersion, VersionList,
    VersionRef,
};
