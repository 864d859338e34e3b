//! Capability traits for the three services the document store composes, plus their adapters.
//!
//! Adapters do the raw I/O only and classify failures into [`DmsError`] kinds; version
//! bookkeeping, key construction and sequencing belong to [`crate::store::DocumentStore`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DmsResult;
use crate::store::types::{Metadata, Row, RowFilter, SearchResponse};

pub mod hbase;
pub mod memory;
pub mod solr;
pub mod webhdfs;

pub use hbase::HBaseTable;
pub use memory::{MemoryBlobStore, MemorySearchIndex, MemoryTable};
pub use solr::SolrIndex;
pub use webhdfs::WebHdfs;

/// Byte content addressed by path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `content` at `path`. Without `overwrite`, an existing file is an error.
    async fn put(&self, path: &str, content: &[u8], overwrite: bool) -> DmsResult<()>;

    /// Read the whole file at `path`.
    async fn get(&self, path: &str) -> DmsResult<Vec<u8>>;

    /// Delete `path`; `Ok(false)` when the service reports nothing was deleted.
    async fn delete(&self, path: &str) -> DmsResult<bool>;

    /// Service-reported status of `path` (size, timestamps, ...) flattened to strings.
    async fn stat(&self, path: &str) -> DmsResult<Metadata>;
}

/// Row store: row key -> column family -> column -> value.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn table_exists(&self) -> DmsResult<bool>;

    async fn create_table(&self, families: &[&str]) -> DmsResult<()>;

    /// Merge one cell into a row, creating the row if needed.
    async fn insert(&self, key: &str, family: &str, column: &str, value: &[u8]) -> DmsResult<()>;

    async fn fetch(&self, key: &str) -> DmsResult<Option<Row>>;

    /// Every row whose key passes `filter`, in ascending key order.
    async fn fetch_all(&self, filter: &RowFilter) -> DmsResult<Vec<(String, Row)>>;

    /// Keys of every row passing `filter`, ascending, without moving cell values.
    async fn scan_keys(&self, filter: &RowFilter) -> DmsResult<Vec<String>> {
        Ok(self.fetch_all(filter).await?.into_iter().map(|(k, _)| k).collect())
    }

    async fn delete(&self, key: &str) -> DmsResult<()>;
}

/// Free-text search over indexed documents.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn query(&self, text: &str) -> DmsResult<SearchResponse>;
}

/// Clients handed to a [`crate::store::DocumentStore`] at construction.
/// The search index is optional; without one `search` reports a precondition failure.
#[derive(Clone)]
pub struct Backends {
    pub blob: Arc<dyn BlobStore>,
    pub table: Arc<dyn TableStore>,
    pub search: Option<Arc<dyn SearchIndex>>,
}

impl Backends {
    pub fn new(blob: Arc<dyn BlobStore>, table: Arc<dyn TableStore>) -> Self {
        Self { blob, table, search: None }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchIndex>) -> Self {
        self.search = Some(search);
        self
    }

    /// Fresh in-memory backends, handy for tests and local experiments.
    pub fn in_memory() -> (Self, Arc<MemoryBlobStore>, Arc<MemoryTable>, Arc<MemorySearchIndex>) {
        let blob = Arc::new(MemoryBlobStore::new());
        let table = Arc::new(MemoryTable::new());
        let search = Arc::new(MemorySearchIndex::new());
        let backends = Backends::new(blob.clone(), table.clone()).with_search(search.clone());
        (backends, blob, table, search)
    }
}

/// Shared reqwest client with the given per-request timeout.
pub(crate) fn http_client(timeout_ms: u64, follow_redirects: bool) -> DmsResult<reqwest::Client> {
    let mut b = reqwest::Client::builder();
    if timeout_ms > 0 {
        b = b.timeout(std::time::Duration::from_millis(timeout_ms));
    }
    if !follow_redirects {
        b = b.redirect(reqwest::redirect::Policy::none());
    }
    Ok(b.build()?)
}

/// Body text of an unsuccessful response, capped so it stays readable in a log line.
pub(crate) async fn error_body(resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    let trimmed = text.trim();
    if trimmed.chars().count() > 200 {
        trimmed.chars().take(200).collect::<String>() + "…"
    } else {
        trimmed.to_string()
    }
}
