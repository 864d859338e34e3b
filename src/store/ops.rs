//! Versioned document operations over the injected backends.
//!
//! Every operation resolves the target version, builds the row key, then issues a short,
//! fixed sequence of backend calls. Writes span two services with no transaction: a failure
//! midway leaves whatever was already written in place, and the error says which step failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_absolutize::Absolutize;
use tracing::{debug, info, warn};

use super::correlation::CorrelationId;
use super::keys::{blob_path, clean_name, name_filter_regex, RowKey};
use super::locks::NameLocks;
use super::types::{
    family_strings, row_metadata, ContentPlacement, Metadata, Retrieved, Row, RowFilter,
    SearchResponse, StoredVersion, VersionList, VersionRef, COLUMN_CONTENT, COLUMN_NAME,
    COLUMN_VERSION, FAMILY_FILE, FAMILY_META,
};
use crate::backends::Backends;
use crate::config::DocvaultConfig;
use crate::error::{DmsError, DmsResult};
use crate::extract::{BuiltinExtractor, MetadataExtractor};

/// Behavior knobs that do not belong to any one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    /// Blob store directory receiving `v<N>.<name>` files
    pub blob_root: String,
    pub placement: ContentPlacement,
    pub debug: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { blob_root: "/tmp/".to_string(), placement: ContentPlacement::Both, debug: false }
    }
}

impl From<&DocvaultConfig> for StoreOptions {
    fn from(cfg: &DocvaultConfig) -> Self {
        Self { blob_root: cfg.blob.root_path.clone(), placement: cfg.content_placement, debug: cfg.debug }
    }
}

/// Versioned put/get/delete/list over a blob store, a table store and a search index.
pub struct DocumentStore {
    backends: Backends,
    extractor: Arc<dyn MetadataExtractor>,
    opts: StoreOptions,
    locks: NameLocks,
}

impl DocumentStore {
    pub fn new(backends: Backends, opts: StoreOptions) -> Self {
        Self { backends, extractor: Arc::new(BuiltinExtractor), opts, locks: NameLocks::new() }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Build the store and make sure the table exists with its two column families.
    pub async fn open(backends: Backends, opts: StoreOptions) -> DmsResult<Self> {
        let store = Self::new(backends, opts);
        store.ensure_table().await?;
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions { &self.opts }

    pub async fn ensure_table(&self) -> DmsResult<()> {
        let t = &self.backends.table;
        if !t.table_exists().await? {
            t.create_table(&[FAMILY_META, FAMILY_FILE]).await?;
            info!(target: "docvault::store", "created table with families [{}, {}]", FAMILY_META, FAMILY_FILE);
        }
        Ok(())
    }

    fn report<T>(&self, corr: &CorrelationId, object: &str, res: &DmsResult<T>) {
        match res {
            Ok(_) if self.opts.debug => info!(target: "docvault::store", "{} ok [corr={}]", object, corr),
            Ok(_) => debug!(target: "docvault::store", "{} ok [corr={}]", object, corr),
            Err(e) if self.opts.debug => warn!(target: "docvault::store", "{} failed: {} [corr={}]", object, e, corr),
            Err(e) => debug!(target: "docvault::store", "{} failed: {} [corr={}]", object, e, corr),
        }
    }

    // ------------------------------------------------------------------------------------
    // Version scan
    // ------------------------------------------------------------------------------------

    /// Parse every candidate row key and keep the versions of exactly `name`.
    async fn scan_versions(&self, name: &str) -> DmsResult<Vec<u64>> {
        let keys = self
            .backends
            .table
            .scan_keys(&RowFilter::KeyRegex(name_filter_regex(name)))
            .await?;
        let mut versions: Vec<u64> = keys
            .iter()
            .filter_map(|k| RowKey::parse(k).ok())
            .filter(|rk| rk.name == name)
            .map(|rk| rk.version)
            .collect();
        versions.sort_unstable();
        versions.dedup();
        Ok(versions)
    }

    async fn resolve(&self, name: &str, version: VersionRef) -> DmsResult<u64> {
        match version {
            VersionRef::Exact(0) => Err(DmsError::user("bad_version", "version numbers start at 1")),
            VersionRef::Exact(v) => Ok(v),
            VersionRef::Latest => self.scan_versions(name).await?.last().copied().ok_or_else(|| {
                DmsError::not_found("no_versions".to_string(), format!("nothing stored under '{}'", name))
            }),
        }
    }

    /// Like `resolve`, but an empty history means the caller has to name a version.
    async fn resolve_required(&self, name: &str, version: VersionRef) -> DmsResult<u64> {
        match self.resolve(name, version).await {
            Err(e) if e.code_str() == "no_versions" => Err(DmsError::precondition(
                "version_required".to_string(),
                format!("no stored versions of '{}' to default to; supply a version", name),
            )),
            other => other,
        }
    }

    async fn require_row(&self, key: &RowKey) -> DmsResult<Row> {
        let row_key = key.to_string();
        self.backends
            .table
            .fetch(&row_key)
            .await?
            .ok_or_else(|| DmsError::not_found("row_missing".to_string(), format!("{} is not stored", row_key)))
    }

    // ------------------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------------------

    /// Blob first, then the table row one cell at a time. Stops at the first failure.
    async fn write_version(&self, key: &RowKey, content: &[u8], corr: &CorrelationId) -> DmsResult<StoredVersion> {
        let row_key = key.to_string();
        let mut blob_meta = Metadata::new();
        if self.opts.placement.in_blob() {
            let path = key.blob_path(&self.opts.blob_root);
            self.backends.blob.put(&path, content, true).await?;
            blob_meta = self.backends.blob.stat(&path).await?;
        }
        let extracted = self.extractor.extract(&key.name, content).unwrap_or_else(|| {
            debug!(target: "docvault::store", "no metadata extracted for {} [corr={}]", row_key, corr);
            Metadata::new()
        });

        let t = &self.backends.table;
        let mut cells = 0usize;
        let partial = |cells: usize, e: DmsError| {
            if cells > 0 || self.opts.placement.in_blob() {
                warn!(target: "docvault::store", "{} left partially written after {} cells [corr={}]", row_key, cells, corr);
            }
            e
        };
        if self.opts.placement.in_table() {
            t.insert(&row_key, FAMILY_FILE, COLUMN_CONTENT, content).await.map_err(|e| partial(cells, e))?;
            cells += 1;
        }
        t.insert(&row_key, FAMILY_FILE, COLUMN_NAME, key.name.as_bytes()).await.map_err(|e| partial(cells, e))?;
        cells += 1;
        for (col, val) in extracted.iter().chain(blob_meta.iter()) {
            t.insert(&row_key, FAMILY_META, col, val.as_bytes()).await.map_err(|e| partial(cells, e))?;
            cells += 1;
        }
        t.insert(&row_key, FAMILY_META, COLUMN_VERSION, key.version.to_string().as_bytes())
            .await
            .map_err(|e| partial(cells, e))?;
        cells += 1;

        crate::tprintln!("docvault write_version ok key={} size={} cells={} [corr={}]", row_key, content.len(), cells, corr);
        Ok(StoredVersion {
            name: key.name.clone(),
            version: key.version,
            row_key,
            size_bytes: content.len() as u64,
            cells_written: cells,
        })
    }

    async fn store_inner(&self, name: &str, content: &[u8], corr: &CorrelationId) -> DmsResult<StoredVersion> {
        let name = clean_name(name)?;
        let _guard = self.locks.acquire(&name).await;
        let current = self.scan_versions(&name).await?.last().copied().unwrap_or(0);
        let next = current
            .checked_add(1)
            .ok_or_else(|| DmsError::internal("version_overflow".to_string(), format!("'{}' has exhausted its version numbers", name)))?;
        let key = RowKey::new(&name, next)?;
        self.write_version(&key, content, corr).await
    }

    /// Create the next version of `name` with `content`.
    pub async fn store(&self, name: &str, content: &[u8]) -> DmsResult<StoredVersion> {
        let corr = CorrelationId::new("store");
        let res = self.store_inner(name, content, &corr).await;
        let object = res.as_ref().map(|s| s.row_key.clone()).unwrap_or_else(|_| name.to_string());
        self.report(&corr, &object, &res);
        res
    }

    /// Read a local file and store it under its file name.
    pub async fn store_file(&self, path: &Path) -> DmsResult<StoredVersion> {
        let (name, content) = read_local(path).await?;
        self.store(&name, &content).await
    }

    async fn replace_inner(&self, name: &str, version: VersionRef, content: &[u8], corr: &CorrelationId) -> DmsResult<StoredVersion> {
        let name = clean_name(name)?;
        let _guard = self.locks.acquire(&name).await;
        let v = self.resolve_required(&name, version).await?;
        let key = RowKey::new(&name, v)?;
        self.require_row(&key).await?;
        self.write_version(&key, content, corr).await
    }

    /// Overwrite content and metadata of an existing version in place.
    pub async fn replace(&self, name: &str, version: VersionRef, content: &[u8]) -> DmsResult<StoredVersion> {
        let corr = CorrelationId::new("replace");
        let res = self.replace_inner(name, version, content, &corr).await;
        self.report(&corr, name, &res);
        res
    }

    pub async fn replace_file(&self, path: &Path, version: VersionRef) -> DmsResult<StoredVersion> {
        let (name, content) = read_local(path).await?;
        self.replace(&name, version, &content).await
    }

    // ------------------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------------------

    async fn retrieve_inner(&self, name: &str, version: VersionRef) -> DmsResult<Retrieved> {
        let name = clean_name(name)?;
        let v = self.resolve(&name, version).await?;
        let key = RowKey::new(&name, v)?;
        let row = self.require_row(&key).await?;
        let content = if self.opts.placement.in_blob() {
            self.backends.blob.get(&key.blob_path(&self.opts.blob_root)).await?
        } else {
            table_content(&row, &key)?
        };
        Ok(Retrieved { row_key: key.to_string(), name, version: v, content })
    }

    /// Content of one version (latest by default).
    pub async fn retrieve(&self, name: &str, version: VersionRef) -> DmsResult<Retrieved> {
        let corr = CorrelationId::new("retrieve");
        let res = self.retrieve_inner(name, version).await;
        self.report(&corr, name, &res);
        res
    }

    /// Write one version into `dir` as `v<N>.<name>`; returns the absolute path written.
    pub async fn retrieve_to(&self, name: &str, version: VersionRef, dir: &Path) -> DmsResult<PathBuf> {
        let corr = CorrelationId::new("download");
        let res = async {
            let got = self.retrieve_inner(name, version).await?;
            let target = dir.join(&got.row_key);
            tokio::fs::write(&target, &got.content).await?;
            let abs = match target.absolutize() {
                Ok(p) => p.to_path_buf(),
                Err(_) => target.clone(),
            };
            Ok::<_, DmsError>(abs)
        }
        .await;
        self.report(&corr, name, &res);
        res
    }

    /// Stored metadata of one version.
    pub async fn describe(&self, name: &str, version: VersionRef) -> DmsResult<Metadata> {
        let corr = CorrelationId::new("describe");
        let res = async {
            let name = clean_name(name)?;
            let v = self.resolve(&name, version).await?;
            let row = self.require_row(&RowKey::new(&name, v)?).await?;
            Ok::<_, DmsError>(row_metadata(&row))
        }
        .await;
        self.report(&corr, name, &res);
        res
    }

    /// Content kept in the table's `file` family, for stores configured with table placement.
    pub async fn content_from_table(&self, name: &str, version: VersionRef) -> DmsResult<Vec<u8>> {
        let corr = CorrelationId::new("content");
        let res = async {
            let name = clean_name(name)?;
            let v = self.resolve(&name, version).await?;
            let key = RowKey::new(&name, v)?;
            let row = self.require_row(&key).await?;
            table_content(&row, &key)
        }
        .await;
        self.report(&corr, name, &res);
        res
    }

    /// `file` family of one version minus the content itself (currently just the name).
    pub async fn file_info(&self, name: &str, version: VersionRef) -> DmsResult<Metadata> {
        let name = clean_name(name)?;
        let v = self.resolve(&name, version).await?;
        let row = self.require_row(&RowKey::new(&name, v)?).await?;
        let mut m = family_strings(&row, FAMILY_FILE);
        m.remove(COLUMN_CONTENT);
        Ok(m)
    }

    /// Every stored version of `name`, ascending.
    pub async fn list_versions(&self, name: &str) -> DmsResult<VersionList> {
        let corr = CorrelationId::new("list_versions");
        let res = async {
            let name = clean_name(name)?;
            let versions = self.scan_versions(&name).await?;
            Ok::<_, DmsError>(VersionList { name, versions })
        }
        .await;
        self.report(&corr, name, &res);
        res
    }

    /// Every row key in the table, unparsed.
    pub async fn list_all(&self) -> DmsResult<Vec<String>> {
        let corr = CorrelationId::new("list_all");
        let res = self.backends.table.scan_keys(&RowFilter::All).await;
        self.report(&corr, "*", &res);
        res
    }

    pub async fn latest_version(&self, name: &str) -> DmsResult<u64> {
        let corr = CorrelationId::new("latest_version");
        let res = async {
            let name = clean_name(name)?;
            self.resolve(&name, VersionRef::Latest).await
        }
        .await;
        self.report(&corr, name, &res);
        res
    }

    // ------------------------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------------------------

    /// Row first, then blob. A blob failure after the row is gone is reported as is.
    async fn remove_row(&self, row_key: &str) -> DmsResult<String> {
        if self.backends.table.fetch(row_key).await?.is_none() {
            return Err(DmsError::not_found("row_missing".to_string(), format!("{} is not stored", row_key)));
        }
        self.backends.table.delete(row_key).await?;
        if self.opts.placement.in_blob() {
            let path = blob_path(&self.opts.blob_root, row_key);
            if !self.backends.blob.delete(&path).await? {
                return Err(DmsError::not_found(
                    "blob_not_deleted".to_string(),
                    format!("row {} removed but blob store deleted nothing at {}", row_key, path),
                ));
            }
        }
        Ok(row_key.to_string())
    }

    /// Delete one version (latest by default); returns the removed row key.
    pub async fn remove(&self, name: &str, version: VersionRef) -> DmsResult<String> {
        let corr = CorrelationId::new("remove");
        let res = async {
            let name = clean_name(name)?;
            let v = self.resolve_required(&name, version).await?;
            self.remove_row(&RowKey::new(&name, v)?.to_string()).await
        }
        .await;
        self.report(&corr, name, &res);
        res
    }

    /// Delete every version of `name` in ascending order, stopping at the first failure.
    pub async fn remove_all_versions(&self, name: &str) -> DmsResult<Vec<u64>> {
        let corr = CorrelationId::new("remove_all_versions");
        let res = async {
            let name = clean_name(name)?;
            let mut removed = Vec::new();
            for v in self.scan_versions(&name).await? {
                self.remove_row(&RowKey::new(&name, v)?.to_string()).await?;
                removed.push(v);
            }
            Ok::<_, DmsError>(removed)
        }
        .await;
        self.report(&corr, name, &res);
        res
    }

    /// Delete every version of every document, stopping at the first failure.
    /// Rows whose key is not a version key are left alone.
    pub async fn remove_all(&self) -> DmsResult<Vec<String>> {
        let corr = CorrelationId::new("remove_all");
        let res = async {
            let keys = self.backends.table.scan_keys(&RowFilter::All).await?;
            let mut removed = Vec::new();
            for k in keys {
                match RowKey::parse(&k) {
                    Ok(_) => removed.push(self.remove_row(&k).await?),
                    Err(e) => debug!(target: "docvault::store", "skipping foreign row '{}': {} [corr={}]", k, e, corr),
                }
            }
            Ok::<_, DmsError>(removed)
        }
        .await;
        self.report(&corr, "*", &res);
        res
    }

    // ------------------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------------------

    /// Free-text search. `Ok(None)` when the index reports zero matches.
    pub async fn search(&self, text: &str) -> DmsResult<Option<SearchResponse>> {
        let corr = CorrelationId::new("search");
        let res = async {
            let index = self
                .backends
                .search
                .as_ref()
                .ok_or_else(|| DmsError::precondition("search_unconfigured", "no search index configured"))?;
            let resp = index.query(text).await?;
            Ok::<_, DmsError>(if resp.count == 0 { None } else { Some(resp) })
        }
        .await;
        if let Ok(None) = res {
            if self.opts.debug {
                info!(target: "docvault::store", "'{}' not found [corr={}]", text, corr);
            }
        }
        self.report(&corr, text, &res);
        res
    }
}

fn table_content(row: &Row, key: &RowKey) -> DmsResult<Vec<u8>> {
    row.get(FAMILY_FILE)
        .and_then(|f| f.get(COLUMN_CONTENT))
        .cloned()
        .ok_or_else(|| DmsError::not_found("content_not_in_table".to_string(), format!("{} has no content column", key)))
}

async fn read_local(path: &Path) -> DmsResult<(String, Vec<u8>)> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DmsError::user("bad_path".to_string(), format!("'{}' does not name a file", path.display())))?;
    let content = tokio::fs::read(path).await?;
    Ok((name, content))
}

#[cfg(test)]
#[path = "tests/ops_tests.rs"]
mod ops_tests;
