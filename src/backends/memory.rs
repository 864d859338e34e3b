//! In-memory implementations of the backend traits.
//! Behave like the REST services closely enough for the store's contract: missing table,
//! unknown column families, create-without-overwrite conflicts and scanner filters all
//! fail the way the real services do. Each one can be told to fail specific operations.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::Value;

use super::{BlobStore, SearchIndex, TableStore};
use crate::error::{DmsError, DmsResult};
use crate::store::types::{Metadata, Row, RowFilter, SearchResponse};

/// Per-operation failure switches. An entry maps an operation name to the number of calls
/// that still succeed before every further call fails.
#[derive(Default)]
struct Faults {
    plan: Mutex<HashMap<String, u32>>,
}

impl Faults {
    fn fail_after(&self, op: &str, successes: u32) {
        self.plan.lock().insert(op.to_string(), successes);
    }

    fn clear(&self) {
        self.plan.lock().clear();
    }

    fn check(&self, service: &str, op: &str) -> DmsResult<()> {
        let mut plan = self.plan.lock();
        if let Some(left) = plan.get_mut(op) {
            if *left == 0 {
                return Err(DmsError::connect(
                    format!("{service}_injected"),
                    format!("injected failure for {service}.{op}"),
                ));
            }
            *left -= 1;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct BlobEntry {
    content: Vec<u8>,
    modified_ms: i64,
    accessed_ms: i64,
}

/// Blob store kept in a map keyed by path.
#[derive(Default)]
pub struct MemoryBlobStore {
    files: RwLock<BTreeMap<String, BlobEntry>>,
    faults: Faults,
}

impl MemoryBlobStore {
    pub fn new() -> Self { Self::default() }

    /// Make every call of `op` ("put", "get", "delete", "stat") fail.
    pub fn fail_on(&self, op: &str) { self.faults.fail_after(op, 0); }

    /// Let `successes` calls of `op` through, then fail the rest.
    pub fn fail_after(&self, op: &str, successes: u32) { self.faults.fail_after(op, successes); }

    pub fn clear_faults(&self) { self.faults.clear(); }

    pub fn paths(&self) -> Vec<String> { self.files.read().keys().cloned().collect() }

    pub fn contains(&self, path: &str) -> bool { self.files.read().contains_key(path) }

    pub fn len(&self) -> usize { self.files.read().len() }

    pub fn is_empty(&self) -> bool { self.files.read().is_empty() }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, content: &[u8], overwrite: bool) -> DmsResult<()> {
        self.faults.check("memory_blob", "put")?;
        let mut files = self.files.write();
        if !overwrite && files.contains_key(path) {
            return Err(DmsError::from_status("memory_blob", 409, format!("{} already exists", path)));
        }
        let now = Utc::now().timestamp_millis();
        files.insert(path.to_string(), BlobEntry { content: content.to_vec(), modified_ms: now, accessed_ms: now });
        Ok(())
    }

    async fn get(&self, path: &str) -> DmsResult<Vec<u8>> {
        self.faults.check("memory_blob", "get")?;
        let mut files = self.files.write();
        let entry = files
            .get_mut(path)
            .ok_or_else(|| DmsError::not_found("blob_not_found".to_string(), format!("{} does not exist", path)))?;
        entry.accessed_ms = Utc::now().timestamp_millis();
        Ok(entry.content.clone())
    }

    async fn delete(&self, path: &str) -> DmsResult<bool> {
        self.faults.check("memory_blob", "delete")?;
        Ok(self.files.write().remove(path).is_some())
    }

    async fn stat(&self, path: &str) -> DmsResult<Metadata> {
        self.faults.check("memory_blob", "stat")?;
        let files = self.files.read();
        let entry = files
            .get(path)
            .ok_or_else(|| DmsError::not_found("blob_not_found".to_string(), format!("{} does not exist", path)))?;
        let mut m = Metadata::new();
        m.insert("length".into(), entry.content.len().to_string());
        m.insert("modificationTime".into(), entry.modified_ms.to_string());
        m.insert("accessTime".into(), entry.accessed_ms.to_string());
        m.insert("type".into(), "FILE".into());
        m.insert("permission".into(), "644".into());
        m.insert("replication".into(), "1".into());
        m.insert("pathSuffix".into(), String::new());
        Ok(m)
    }
}

/// Table kept as an ordered map of rows.
#[derive(Default)]
pub struct MemoryTable {
    families: RwLock<Option<Vec<String>>>,
    rows: RwLock<BTreeMap<String, Row>>,
    faults: Faults,
}

impl MemoryTable {
    /// A table that does not exist yet; `create_table` brings it up.
    pub fn new() -> Self { Self::default() }

    /// Make every call of `op` ("insert", "fetch", "fetch_all", "delete", ...) fail.
    pub fn fail_on(&self, op: &str) { self.faults.fail_after(op, 0); }

    pub fn fail_after(&self, op: &str, successes: u32) { self.faults.fail_after(op, successes); }

    pub fn clear_faults(&self) { self.faults.clear(); }

    pub fn row_keys(&self) -> Vec<String> { self.rows.read().keys().cloned().collect() }

    pub fn row(&self, key: &str) -> Option<Row> { self.rows.read().get(key).cloned() }

    fn require_family(&self, family: &str) -> DmsResult<()> {
        match self.families.read().as_ref() {
            None => Err(DmsError::not_found("table_missing", "table has not been created")),
            Some(fams) if fams.iter().any(|f| f == family) => Ok(()),
            Some(_) => Err(DmsError::from_status("memory_table", 400, format!("unknown column family '{}'", family))),
        }
    }

    fn require_table(&self) -> DmsResult<()> {
        if self.families.read().is_none() {
            return Err(DmsError::not_found("table_missing", "table has not been created"));
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for MemoryTable {
    async fn table_exists(&self) -> DmsResult<bool> {
        self.faults.check("memory_table", "table_exists")?;
        Ok(self.families.read().is_some())
    }

    async fn create_table(&self, families: &[&str]) -> DmsResult<()> {
        self.faults.check("memory_table", "create_table")?;
        let mut fams = self.families.write();
        let merged = fams.get_or_insert_with(Vec::new);
        for f in families {
            if !merged.iter().any(|x| x == f) {
                merged.push(f.to_string());
            }
        }
        Ok(())
    }

    async fn insert(&self, key: &str, family: &str, column: &str, value: &[u8]) -> DmsResult<()> {
        self.faults.check("memory_table", "insert")?;
        self.require_family(family)?;
        self.rows
            .write()
            .entry(key.to_string())
            .or_default()
            .entry(family.to_string())
            .or_default()
            .insert(column.to_string(), value.to_vec());
        Ok(())
    }

    async fn fetch(&self, key: &str) -> DmsResult<Option<Row>> {
        self.faults.check("memory_table", "fetch")?;
        self.require_table()?;
        Ok(self.rows.read().get(key).cloned())
    }

    async fn fetch_all(&self, filter: &RowFilter) -> DmsResult<Vec<(String, Row)>> {
        self.faults.check("memory_table", "fetch_all")?;
        self.require_table()?;
        let re = key_regex(filter)?;
        let rows = self.rows.read();
        Ok(rows
            .iter()
            .filter(|(k, _)| re.as_ref().map(|r| r.is_match(k)).unwrap_or(true))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect())
    }

    async fn scan_keys(&self, filter: &RowFilter) -> DmsResult<Vec<String>> {
        self.faults.check("memory_table", "fetch_all")?;
        self.require_table()?;
        let re = key_regex(filter)?;
        let rows = self.rows.read();
        Ok(rows
            .keys()
            .filter(|k| re.as_ref().map(|r| r.is_match(k)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> DmsResult<()> {
        self.faults.check("memory_table", "delete")?;
        self.require_table()?;
        match self.rows.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(DmsError::not_found("row_not_found".to_string(), format!("row {} does not exist", key))),
        }
    }
}

fn key_regex(filter: &RowFilter) -> DmsResult<Option<Regex>> {
    match filter {
        RowFilter::All => Ok(None),
        RowFilter::KeyRegex(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| DmsError::user("bad_filter".to_string(), e.to_string())),
    }
}

/// Search index over JSON documents; a document matches when any string value contains
/// the query text, ignoring case. `*:*` matches everything.
#[derive(Default)]
pub struct MemorySearchIndex {
    docs: RwLock<Vec<Value>>,
    faults: Faults,
}

impl MemorySearchIndex {
    pub fn new() -> Self { Self::default() }

    pub fn add(&self, doc: Value) { self.docs.write().push(doc); }

    pub fn fail_on(&self, op: &str) { self.faults.fail_after(op, 0); }

    pub fn clear_faults(&self) { self.faults.clear(); }
}

fn value_contains(v: &Value, needle: &str) -> bool {
    match v {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|i| value_contains(i, needle)),
        Value::Object(map) => map.values().any(|i| value_contains(i, needle)),
        _ => false,
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn query(&self, text: &str) -> DmsResult<SearchResponse> {
        self.faults.check("memory_search", "query")?;
        let docs = self.docs.read();
        let matched: Vec<Value> = if text.trim() == "*:*" {
            docs.clone()
        } else {
            let needle = text.trim().to_lowercase();
            docs.iter().filter(|d| !needle.is_empty() && value_contains(d, &needle)).cloned().collect()
        };
        Ok(SearchResponse { count: matched.len() as u64, docs: matched })
    }
}
