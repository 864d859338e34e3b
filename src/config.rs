//! Connection and behavior settings for the document store.
//! Layers, lowest precedence first: built-in defaults, a JSON file, `DOCVAULT_*`
//! environment variables, then whatever the command line sets on top.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backends::{Backends, HBaseTable, SolrIndex, WebHdfs};
use crate::store::types::ContentPlacement;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TableConfig {
    /// HBase REST gateway, e.g. `http://localhost:8080`
    pub url: String,
    pub table: String,
    /// 0 leaves the client default (no timeout)
    pub timeout_ms: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { url: "http://localhost:8080".to_string(), table: "dms".to_string(), timeout_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlobConfig {
    /// WebHDFS namenode, e.g. `http://localhost:50070`
    pub url: String,
    pub user_name: String,
    /// Directory that receives `v<N>.<name>` files
    pub root_path: String,
    pub timeout_ms: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:50070".to_string(),
            user_name: whoami::username(),
            root_path: "/tmp/".to_string(),
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Solr base, e.g. `http://localhost:8983`
    pub url: String,
    pub collection: String,
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { url: "http://localhost:8983".to_string(), collection: "dms".to_string(), timeout_ms: 15_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DocvaultConfig {
    pub table: TableConfig,
    pub blob: BlobConfig,
    pub search: Option<SearchConfig>,
    pub content_placement: ContentPlacement,
    /// Report failures at warn level with operation, object and cause.
    pub debug: bool,
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl DocvaultConfig {
    /// Read a JSON config file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Defaults, then `path` (or `DOCVAULT_CONFIG`) when given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("DOCVAULT_CONFIG").ok().filter(|s| !s.trim().is_empty());
        let mut cfg = match (path, env_path.as_deref()) {
            (Some(p), _) => Self::from_file(p)?,
            (None, Some(p)) => Self::from_file(Path::new(p))?,
            (None, None) => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Overlay `DOCVAULT_*` variables read through `get`.
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, get: F) -> Result<()> {
        if let Some(v) = get("DOCVAULT_HBASE_URL") { self.table.url = v; }
        if let Some(v) = get("DOCVAULT_TABLE") { self.table.table = v; }
        if let Some(v) = get("DOCVAULT_WEBHDFS_URL") { self.blob.url = v; }
        if let Some(v) = get("DOCVAULT_HDFS_USER") { self.blob.user_name = v; }
        if let Some(v) = get("DOCVAULT_HDFS_PATH") { self.blob.root_path = v; }
        if let Some(v) = get("DOCVAULT_SOLR_URL") {
            self.search.get_or_insert_with(SearchConfig::default).url = v;
        }
        if let Some(v) = get("DOCVAULT_SOLR_COLLECTION") {
            self.search.get_or_insert_with(SearchConfig::default).collection = v;
        }
        if let Some(v) = get("DOCVAULT_CONTENT_PLACEMENT") {
            self.content_placement = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = get("DOCVAULT_DEBUG") {
            if let Some(b) = parse_bool(&v) { self.debug = b; }
        }
        Ok(())
    }

    /// Build the REST clients described by this config.
    pub fn connect(&self) -> Result<Backends> {
        let table = HBaseTable::new(&self.table.url, &self.table.table, self.table.timeout_ms)?;
        let blob = WebHdfs::new(&self.blob.url, &self.blob.user_name, self.blob.timeout_ms)?;
        let mut backends = Backends::new(Arc::new(blob), Arc::new(table));
        if let Some(s) = &self.search {
            backends = backends.with_search(Arc::new(SolrIndex::new(&s.url, &s.collection, s.timeout_ms)?));
        }
        Ok(backends)
    }
}
