//! Data contracts shared by the document store and its backends.
//! Keep this module purely about types/serde and light helpers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Column family holding extracted and blob-store metadata plus the version number.
pub const FAMILY_META: &str = "meta_data";
/// Column family holding the content itself (when placed in the table) and the document name.
pub const FAMILY_FILE: &str = "file";
pub const COLUMN_CONTENT: &str = "content";
pub const COLUMN_NAME: &str = "name";
pub const COLUMN_VERSION: &str = "version";

/// Flat string mapping used for every kind of metadata.
pub type Metadata = BTreeMap<String, String>;

/// One table row: column family -> column -> raw cell value.
pub type Row = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Which version an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VersionRef {
    #[default]
    Latest,
    Exact(u64),
}

impl From<Option<u64>> for VersionRef {
    fn from(v: Option<u64>) -> Self {
        match v {
            Some(n) => VersionRef::Exact(n),
            None => VersionRef::Latest,
        }
    }
}

impl From<u64> for VersionRef {
    fn from(v: u64) -> Self { VersionRef::Exact(v) }
}

/// Where the bytes of a version are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentPlacement {
    Blob,
    Table,
    #[default]
    Both,
}

impl ContentPlacement {
    pub fn in_blob(self) -> bool { matches!(self, ContentPlacement::Blob | ContentPlacement::Both) }
    pub fn in_table(self) -> bool { matches!(self, ContentPlacement::Table | ContentPlacement::Both) }
}

impl std::str::FromStr for ContentPlacement {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blob" => Ok(ContentPlacement::Blob),
            "table" => Ok(ContentPlacement::Table),
            "both" => Ok(ContentPlacement::Both),
            other => Err(format!("unknown content placement '{}'", other)),
        }
    }
}

/// Result of `store`/`replace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVersion {
    pub name: String,
    pub version: u64,
    pub row_key: String,
    pub size_bytes: u64,
    /// Number of table cells written for this version.
    pub cells_written: usize,
}

/// Content read back for one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub name: String,
    pub version: u64,
    pub row_key: String,
    pub content: Vec<u8>,
}

/// Versions known for one document, ascending and de-duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VersionList {
    pub name: String,
    pub versions: Vec<u64>,
}

impl VersionList {
    pub fn is_empty(&self) -> bool { self.versions.is_empty() }
}

/// Row selection for a table scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    All,
    /// Regular expression matched against the whole row key.
    KeyRegex(String),
}

/// Answer of the search index; `count` is the total number of matches reported by the index,
/// which may exceed `docs.len()` when the index pages results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchResponse {
    pub count: u64,
    pub docs: Vec<serde_json::Value>,
}

/// Flatten a row's `meta_data` family into strings (lossy UTF-8 for odd cells).
pub fn row_metadata(row: &Row) -> Metadata {
    family_strings(row, FAMILY_META)
}

pub fn family_strings(row: &Row, family: &str) -> Metadata {
    row.get(family)
        .map(|cols| {
            cols.iter()
                .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
                .collect()
        })
        .unwrap_or_default()
}
