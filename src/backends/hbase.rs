//! Table store adapter for the HBase REST gateway.
//!
//! Uses the JSON representation of the gateway: row keys, columns and cell values travel
//! base64-encoded inside a `CellSet`. Scans go through a stateful scanner resource that is
//! drained batch by batch and deleted afterwards.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{error_body, http_client, TableStore};
use crate::error::{DmsError, DmsResult};
use crate::store::types::{Row, RowFilter};

const JSON: &str = "application/json";
const SCAN_BATCH: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CellSet {
    #[serde(rename = "Row", default)]
    rows: Vec<RowJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RowJson {
    key: String,
    #[serde(rename = "Cell", default)]
    cells: Vec<CellJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CellJson {
    column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
    #[serde(rename = "$")]
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct TableSchema<'a> {
    name: &'a str,
    #[serde(rename = "ColumnSchema")]
    column_schema: Vec<ColumnSchema<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct ColumnSchema<'a> {
    name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ScannerSpec {
    batch: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
}

/// Client for one table behind an HBase REST gateway.
#[derive(Clone)]
pub struct HBaseTable {
    base: String,
    table: String,
    client: reqwest::Client,
}

impl HBaseTable {
    pub fn new(url: &str, table: &str, timeout_ms: u64) -> DmsResult<Self> {
        let parsed = Url::parse(url).map_err(|e| DmsError::user("hbase_url".to_string(), format!("invalid HBase REST url '{}': {}", url, e)))?;
        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
            table: table.to_string(),
            client: http_client(timeout_ms, true)?,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base, urlencoding::encode(&self.table))
    }

    fn row_url(&self, key: &str) -> String {
        format!("{}/{}", self.table_url(), urlencoding::encode(key))
    }

    fn cell_url(&self, key: &str, family: &str, column: &str) -> String {
        let col = format!("{}:{}", family, column);
        format!("{}/{}", self.row_url(key), urlencoding::encode(&col))
    }

    async fn fail(resp: reqwest::Response, what: &str) -> DmsError {
        let status = resp.status().as_u16();
        let body = error_body(resp).await;
        DmsError::from_status("hbase", status, format!("{} failed with HTTP {}: {}", what, status, body))
    }

    /// Open a scanner, drain it batch by batch and delete it, even when a batch fails.
    async fn scan(&self, filter: &RowFilter, keys_only: bool) -> DmsResult<Vec<(String, Row)>> {
        let spec = ScannerSpec { batch: SCAN_BATCH, filter: scan_filter(filter, keys_only) };
        let resp = self
            .client
            .put(format!("{}/scanner", self.table_url()))
            .header(ACCEPT, JSON)
            .header(CONTENT_TYPE, JSON)
            .json(&spec)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "scanner creation").await);
        }
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| DmsError::malformed("hbase_scanner", "scanner created without a Location header"))?;
        let location = if location.starts_with("http://") || location.starts_with("https://") {
            location
        } else {
            format!("{}/{}", self.base, location.trim_start_matches('/'))
        };

        let mut out: Vec<(String, Row)> = Vec::new();
        let drained = loop {
            let batch = match self.client.get(&location).header(ACCEPT, JSON).send().await {
                Ok(r) => r,
                Err(e) => break Err(DmsError::from(e)),
            };
            match batch.status() {
                StatusCode::NO_CONTENT => break Ok(()),
                s if s.is_success() => {
                    let bytes = match batch.bytes().await {
                        Ok(b) => b,
                        Err(e) => break Err(DmsError::from(e)),
                    };
                    if bytes.is_empty() {
                        break Ok(());
                    }
                    let parsed = serde_json::from_slice::<CellSet>(&bytes)
                        .map_err(DmsError::from)
                        .and_then(|set| decode_cellset(set, &mut out));
                    if let Err(e) = parsed {
                        break Err(e);
                    }
                }
                _ => break Err(Self::fail(batch, "scanner read").await),
            }
        };
        self.delete_scanner(&location).await;
        drained?;
        out.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(target: "docvault::hbase", "scan of '{}' returned {} rows (keys only: {})", self.table, out.len(), keys_only);
        Ok(out)
    }

    async fn delete_scanner(&self, location: &str) {
        if let Err(e) = self.client.delete(location).send().await {
            debug!(target: "docvault::hbase", "scanner cleanup failed for {}: {}", location, e);
        }
    }
}

fn row_regex_value(pattern: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "RowFilter",
        "op": "EQUAL",
        "comparator": { "type": "RegexStringComparator", "value": pattern }
    })
}

/// Filter JSON understood by the gateway's scanner for a whole-key regex match.
pub fn row_regex_filter(pattern: &str) -> String {
    row_regex_value(pattern).to_string()
}

/// Scanner filter for `filter`. With `keys_only` the gateway strips every cell value.
pub fn scan_filter(filter: &RowFilter, keys_only: bool) -> Option<String> {
    let key_only = serde_json::json!({ "type": "KeyOnlyFilter" });
    match (filter, keys_only) {
        (RowFilter::All, false) => None,
        (RowFilter::All, true) => Some(key_only.to_string()),
        (RowFilter::KeyRegex(p), false) => Some(row_regex_filter(p)),
        (RowFilter::KeyRegex(p), true) => Some(
            serde_json::json!({
                "type": "FilterList",
                "op": "MUST_PASS_ALL",
                "filters": [row_regex_value(p), key_only]
            })
            .to_string(),
        ),
    }
}

fn decode_cellset(set: CellSet, out: &mut Vec<(String, Row)>) -> DmsResult<()> {
    for r in set.rows {
        let key = String::from_utf8(B64.decode(r.key.as_bytes())?)
            .map_err(|e| DmsError::malformed("hbase_row_key".to_string(), e.to_string()))?;
        // A row can be split across scanner batches; merge into the previous entry.
        let idx = match out.last() {
            Some((k, _)) if *k == key => out.len() - 1,
            _ => {
                out.push((key, Row::new()));
                out.len() - 1
            }
        };
        for c in r.cells {
            let col = String::from_utf8(B64.decode(c.column.as_bytes())?)
                .map_err(|e| DmsError::malformed("hbase_column".to_string(), e.to_string()))?;
            let (family, qualifier) = col.split_once(':').unwrap_or((col.as_str(), ""));
            let value = B64.decode(c.value.as_bytes())?;
            out[idx]
                .1
                .entry(family.to_string())
                .or_default()
                .insert(qualifier.to_string(), value);
        }
    }
    Ok(())
}

#[async_trait]
impl TableStore for HBaseTable {
    async fn table_exists(&self) -> DmsResult<bool> {
        let resp = self
            .client
            .get(format!("{}/schema", self.table_url()))
            .header(ACCEPT, JSON)
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::fail(resp, "schema lookup").await),
        }
    }

    async fn create_table(&self, families: &[&str]) -> DmsResult<()> {
        let schema = TableSchema {
            name: &self.table,
            column_schema: families.iter().map(|f| ColumnSchema { name: f }).collect(),
        };
        let resp = self
            .client
            .put(format!("{}/schema", self.table_url()))
            .header(ACCEPT, JSON)
            .json(&schema)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "table creation").await);
        }
        debug!(target: "docvault::hbase", "created table '{}' families={:?}", self.table, families);
        Ok(())
    }

    async fn insert(&self, key: &str, family: &str, column: &str, value: &[u8]) -> DmsResult<()> {
        let body = CellSet {
            rows: vec![RowJson {
                key: B64.encode(key.as_bytes()),
                cells: vec![CellJson {
                    column: B64.encode(format!("{}:{}", family, column).as_bytes()),
                    timestamp: None,
                    value: B64.encode(value),
                }],
            }],
        };
        let resp = self
            .client
            .put(self.cell_url(key, family, column))
            .header(ACCEPT, JSON)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, &format!("insert {}:{} into {}", family, column, key)).await);
        }
        Ok(())
    }

    async fn fetch(&self, key: &str) -> DmsResult<Option<Row>> {
        let resp = self.client.get(self.row_url(key)).header(ACCEPT, JSON).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::fail(resp, &format!("fetch {}", key)).await);
        }
        let set: CellSet = serde_json::from_slice(&resp.bytes().await?)?;
        let mut rows = Vec::new();
        decode_cellset(set, &mut rows)?;
        Ok(rows.into_iter().find(|(k, _)| k == key).map(|(_, r)| r))
    }

    async fn fetch_all(&self, filter: &RowFilter) -> DmsResult<Vec<(String, Row)>> {
        self.scan(filter, false).await
    }

    async fn scan_keys(&self, filter: &RowFilter) -> DmsResult<Vec<String>> {
        Ok(self.scan(filter, true).await?.into_iter().map(|(k, _)| k).collect())
    }

    async fn delete(&self, key: &str) -> DmsResult<()> {
        let resp = self.client.delete(self.row_url(key)).header(ACCEPT, JSON).send().await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, &format!("delete {}", key)).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_percent_encode_keys() {
        let t = HBaseTable::new("http://127.0.0.1:8080/", "dms", 0).unwrap();
        assert_eq!(t.row_url("v1.a b.txt"), "http://127.0.0.1:8080/dms/v1.a%20b.txt");
        assert_eq!(t.cell_url("v1.a", "meta_data", "version"), "http://127.0.0.1:8080/dms/v1.a/meta_data%3Aversion");
    }

    #[test]
    fn invalid_url_is_user_error() {
        let err = HBaseTable::new("not a url", "dms", 0).err().unwrap();
        assert!(matches!(err, DmsError::UserInput { .. }));
    }

    #[test]
    fn filter_json_shape() {
        let f: serde_json::Value = serde_json::from_str(&row_regex_filter(r"^v[0-9]+\.a$")).unwrap();
        assert_eq!(f["type"], "RowFilter");
        assert_eq!(f["comparator"]["type"], "RegexStringComparator");
        assert_eq!(f["comparator"]["value"], r"^v[0-9]+\.a$");
    }

    #[test]
    fn key_only_scans_wrap_the_row_filter() {
        assert_eq!(scan_filter(&RowFilter::All, false), None);
        let all: serde_json::Value = serde_json::from_str(&scan_filter(&RowFilter::All, true).unwrap()).unwrap();
        assert_eq!(all["type"], "KeyOnlyFilter");
        let f: serde_json::Value =
            serde_json::from_str(&scan_filter(&RowFilter::KeyRegex("^v[0-9]+\\.a$".into()), true).unwrap()).unwrap();
        assert_eq!(f["type"], "FilterList");
        assert_eq!(f["op"], "MUST_PASS_ALL");
        assert_eq!(f["filters"][0]["comparator"]["value"], r"^v[0-9]+\.a$");
        assert_eq!(f["filters"][1]["type"], "KeyOnlyFilter");
    }

    #[test]
    fn cellset_decoding_merges_split_rows() {
        let enc = |s: &str| B64.encode(s.as_bytes());
        let set = CellSet {
            rows: vec![
                RowJson { key: enc("v1.a"), cells: vec![CellJson { column: enc("meta_data:version"), timestamp: Some(1), value: enc("1") }] },
                RowJson { key: enc("v1.a"), cells: vec![CellJson { column: enc("file:name"), timestamp: Some(1), value: enc("a") }] },
                RowJson { key: enc("v2.a"), cells: vec![CellJson { column: enc("meta_data:version"), timestamp: None, value: enc("2") }] },
            ],
        };
        let mut out = Vec::new();
        decode_cellset(set, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].1["file"]["name"], b"a".to_vec());
        assert_eq!(out[0].1["meta_data"]["version"], b"1".to_vec());
        assert_eq!(out[1].0, "v2.a");
    }

    #[test]
    fn cellset_rejects_bad_base64() {
        let set = CellSet { rows: vec![RowJson { key: "***".into(), cells: vec![] }] };
        let mut out = Vec::new();
        assert!(matches!(decode_cellset(set, &mut out), Err(DmsError::Malformed { .. })));
    }
}
