// Mock REST gateways (HBase REST, WebHDFS, Solr) served by axum on ephemeral localhost ports.
// They implement just enough of each wire format for the adapters under test.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Bind 127.0.0.1:0, serve `app` in the background and return the bound address.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("mock server error: {e:?}");
        }
    });
    addr
}

// ---------------------------------------------------------------------------------------
// HBase REST
// ---------------------------------------------------------------------------------------

type Cells = BTreeMap<String, Vec<u8>>;

#[derive(Default)]
pub struct MockHBase {
    pub families: Mutex<Option<Vec<String>>>,
    /// row key -> "family:column" -> value
    pub rows: Mutex<BTreeMap<String, Cells>>,
    /// scanner id -> (keys only, pending batches of row keys)
    scanners: Mutex<HashMap<u64, (bool, Vec<Vec<String>>)>>,
    next_scanner: AtomicU64,
    pub scanners_closed: AtomicUsize,
    /// Total bytes of cell values returned through scanners.
    pub scanned_value_bytes: AtomicUsize,
    pub fail_inserts: AtomicBool,
}

impl MockHBase {
    pub fn open_scanners(&self) -> usize { self.scanners.lock().len() }
}

fn cellset(rows: &[(String, Cells)]) -> Value {
    let rows: Vec<Value> = rows
        .iter()
        .map(|(k, cols)| {
            let cells: Vec<Value> = cols
                .iter()
                .map(|(c, v)| json!({ "column": B64.encode(c), "timestamp": 1, "$": B64.encode(v) }))
                .collect();
            json!({ "key": B64.encode(k), "Cell": cells })
        })
        .collect();
    json!({ "Row": rows })
}

pub fn hbase_router(state: Arc<MockHBase>) -> Router {
    Router::new()
        .route("/{table}/schema", get(hb_schema_get).put(hb_schema_put))
        .route("/{table}/scanner", put(hb_scanner_open))
        .route("/{table}/scanner/{id}", get(hb_scanner_next).delete(hb_scanner_close))
        .route("/{table}/{row}", get(hb_row_get).delete(hb_row_delete))
        .route("/{table}/{row}/{column}", put(hb_cell_put))
        .with_state(state)
}

async fn hb_schema_get(State(s): State<Arc<MockHBase>>, Path(_table): Path<String>) -> StatusCode {
    if s.families.lock().is_some() { StatusCode::OK } else { StatusCode::NOT_FOUND }
}

async fn hb_schema_put(State(s): State<Arc<MockHBase>>, Path(_table): Path<String>, Json(body): Json<Value>) -> StatusCode {
    let fams: Vec<String> = body["ColumnSchema"]
        .as_array()
        .map(|a| a.iter().filter_map(|c| c["name"].as_str().map(String::from)).collect())
        .unwrap_or_default();
    *s.families.lock() = Some(fams);
    StatusCode::CREATED
}

async fn hb_cell_put(
    State(s): State<Arc<MockHBase>>,
    Path((_table, row, column)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    if s.fail_inserts.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    let family = column.split(':').next().unwrap_or("").to_string();
    let known = s.families.lock().as_ref().map(|f| f.contains(&family)).unwrap_or(false);
    if !known {
        return StatusCode::BAD_REQUEST;
    }
    let Some(value) = body["Row"][0]["Cell"][0]["$"].as_str().and_then(|v| B64.decode(v).ok()) else {
        return StatusCode::BAD_REQUEST;
    };
    s.rows.lock().entry(row).or_default().insert(column, value);
    StatusCode::OK
}

async fn hb_row_get(State(s): State<Arc<MockHBase>>, Path((_table, row)): Path<(String, String)>) -> Response {
    let found = s.rows.lock().get(&row).cloned();
    match found {
        Some(cols) => Json(cellset(&[(row, cols)])).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn hb_row_delete(State(s): State<Arc<MockHBase>>, Path((_table, row)): Path<(String, String)>) -> StatusCode {
    if s.rows.lock().remove(&row).is_some() { StatusCode::OK } else { StatusCode::NOT_FOUND }
}

async fn hb_scanner_open(State(s): State<Arc<MockHBase>>, Path(table): Path<String>, Json(spec): Json<Value>) -> Response {
    let batch = spec["batch"].as_u64().unwrap_or(100).max(1) as usize;
    let filter = spec["filter"].as_str().and_then(|f| serde_json::from_str::<Value>(f).ok());
    let parts: Vec<Value> = match filter {
        Some(f) if f["type"] == "FilterList" => f["filters"].as_array().cloned().unwrap_or_default(),
        Some(f) => vec![f],
        None => vec![],
    };
    let key_only = parts.iter().any(|f| f["type"] == "KeyOnlyFilter");
    let pattern = parts
        .iter()
        .find(|f| f["type"] == "RowFilter")
        .and_then(|f| f["comparator"]["value"].as_str().map(String::from));
    let re = match pattern.map(|p| regex::Regex::new(&p)) {
        Some(Ok(r)) => Some(r),
        Some(Err(_)) => return StatusCode::BAD_REQUEST.into_response(),
        None => None,
    };
    let keys: Vec<String> = s
        .rows
        .lock()
        .keys()
        .filter(|k| re.as_ref().map(|r| r.is_match(k)).unwrap_or(true))
        .cloned()
        .collect();
    let id = s.next_scanner.fetch_add(1, Ordering::SeqCst);
    s.scanners.lock().insert(id, (key_only, keys.chunks(batch).map(|c| c.to_vec()).collect()));
    (StatusCode::CREATED, [(header::LOCATION, format!("/{}/scanner/{}", table, id))]).into_response()
}

async fn hb_scanner_next(State(s): State<Arc<MockHBase>>, Path((_table, id)): Path<(String, u64)>) -> Response {
    let (key_only, chunk) = {
        let mut scanners = s.scanners.lock();
        match scanners.get_mut(&id) {
            Some((ko, q)) if !q.is_empty() => (*ko, Some(q.remove(0))),
            Some((ko, _)) => (*ko, None),
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    };
    match chunk {
        None => StatusCode::NO_CONTENT.into_response(),
        Some(keys) => {
            let rows = s.rows.lock();
            let data: Vec<(String, Cells)> = keys
                .iter()
                .filter_map(|k| rows.get(k).map(|c| (k.clone(), c.clone())))
                .map(|(k, mut cells)| {
                    if key_only {
                        cells.values_mut().for_each(Vec::clear);
                    }
                    (k, cells)
                })
                .collect();
            let served: usize = data.iter().flat_map(|(_, c)| c.values()).map(Vec::len).sum();
            s.scanned_value_bytes.fetch_add(served, Ordering::SeqCst);
            Json(cellset(&data)).into_response()
        }
    }
}

async fn hb_scanner_close(State(s): State<Arc<MockHBase>>, Path((_table, id)): Path<(String, u64)>) -> StatusCode {
    s.scanners.lock().remove(&id);
    s.scanners_closed.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

// ---------------------------------------------------------------------------------------
// WebHDFS (namenode redirecting to a "datanode" path on the same server)
// ---------------------------------------------------------------------------------------

#[derive(Default)]
pub struct MockHdfs {
    pub files: Mutex<BTreeMap<String, Vec<u8>>>,
    pub addr: Mutex<Option<SocketAddr>>,
    pub users: Mutex<Vec<String>>,
}

pub fn webhdfs_router(state: Arc<MockHdfs>) -> Router {
    Router::new()
        .route("/webhdfs/v1/{*path}", get(nn_get).put(nn_put).delete(nn_delete))
        .route("/data/{*path}", get(dn_get).put(dn_put))
        .with_state(state)
}

fn remote_exception(status: StatusCode, exception: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "RemoteException": {
            "exception": exception,
            "javaClassName": format!("java.io.{}", exception),
            "message": message
        }})),
    )
        .into_response()
}

fn datanode_url(s: &MockHdfs, path: &str) -> String {
    let addr = s.addr.lock().expect("mock hdfs address set after bind");
    format!("http://{}/data/{}", addr, path)
}

async fn nn_put(State(s): State<Arc<MockHdfs>>, Path(path): Path<String>, Query(q): Query<HashMap<String, String>>) -> Response {
    if let Some(u) = q.get("user.name") { s.users.lock().push(u.clone()); }
    if q.get("op").map(String::as_str) != Some("CREATE") {
        return remote_exception(StatusCode::BAD_REQUEST, "IllegalArgumentException", "unsupported op");
    }
    let full = format!("/{}", path);
    let overwrite = q.get("overwrite").map(|v| v == "true").unwrap_or(false);
    if !overwrite && s.files.lock().contains_key(&full) {
        return remote_exception(StatusCode::FORBIDDEN, "FileAlreadyExistsException", &format!("{} already exists", full));
    }
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, datanode_url(&s, &path))]).into_response()
}

async fn dn_put(State(s): State<Arc<MockHdfs>>, Path(path): Path<String>, body: Bytes) -> StatusCode {
    s.files.lock().insert(format!("/{}", path), body.to_vec());
    StatusCode::CREATED
}

async fn dn_get(State(s): State<Arc<MockHdfs>>, Path(path): Path<String>) -> Response {
    match s.files.lock().get(&format!("/{}", path)).cloned() {
        Some(b) => b.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn nn_get(State(s): State<Arc<MockHdfs>>, Path(path): Path<String>, Query(q): Query<HashMap<String, String>>) -> Response {
    let full = format!("/{}", path);
    let size = s.files.lock().get(&full).map(|b| b.len());
    let Some(size) = size else {
        return remote_exception(StatusCode::NOT_FOUND, "FileNotFoundException", &format!("File does not exist: {}", full));
    };
    match q.get("op").map(String::as_str) {
        Some("OPEN") => (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, datanode_url(&s, &path))]).into_response(),
        Some("GETFILESTATUS") => Json(json!({ "FileStatus": {
            "accessTime": 1714000000000u64,
            "blockSize": 134217728,
            "group": "supergroup",
            "length": size,
            "modificationTime": 1714000000000u64,
            "owner": "hdfs",
            "pathSuffix": "",
            "permission": "644",
            "replication": 3,
            "type": "FILE"
        }}))
        .into_response(),
        _ => remote_exception(StatusCode::BAD_REQUEST, "IllegalArgumentException", "unsupported op"),
    }
}

async fn nn_delete(State(s): State<Arc<MockHdfs>>, Path(path): Path<String>) -> Json<Value> {
    let removed = s.files.lock().remove(&format!("/{}", path)).is_some();
    Json(json!({ "boolean": removed }))
}

// ---------------------------------------------------------------------------------------
// Solr
// ---------------------------------------------------------------------------------------

pub fn solr_router(docs: Vec<Value>) -> Router {
    Router::new().route("/solr/{collection}/select", get(solr_select)).with_state(Arc::new(docs))
}

async fn solr_select(
    State(docs): State<Arc<Vec<Value>>>,
    Path(collection): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if collection == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "core not loaded").into_response();
    }
    if q.get("wt").map(String::as_str) != Some("json") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let text = q.get("q").cloned().unwrap_or_default().to_lowercase();
    let hits: Vec<Value> = docs
        .iter()
        .filter(|d| !text.is_empty() && d.to_string().to_lowercase().contains(&text))
        .cloned()
        .collect();
    Json(json!({
        "responseHeader": { "status": 0, "QTime": 1 },
        "response": { "numFound": hits.len(), "start": 0, "docs": hits }
    }))
    .into_response()
}

// ---------------------------------------------------------------------------------------
// All three together
// ---------------------------------------------------------------------------------------

pub struct Gateways {
    pub hbase: Arc<MockHBase>,
    pub hdfs: Arc<MockHdfs>,
    pub hbase_url: String,
    pub hdfs_url: String,
    pub solr_url: String,
}

pub async fn start_gateways(solr_docs: Vec<Value>) -> Gateways {
    let hbase = Arc::new(MockHBase::default());
    let hdfs = Arc::new(MockHdfs::default());
    let hb_addr = serve(hbase_router(hbase.clone())).await;
    let hdfs_addr = serve(webhdfs_router(hdfs.clone())).await;
    *hdfs.addr.lock() = Some(hdfs_addr);
    let solr_addr = serve(solr_router(solr_docs)).await;
    Gateways {
        hbase,
        hdfs,
        hbase_url: format!("http://{}", hb_addr),
        hdfs_url: format!("http://{}", hdfs_addr),
        solr_url: format!("http://{}", solr_addr),
    }
}
