//! Blob store adapter for the WebHDFS REST API.
//! CREATE and OPEN are two-step calls: the namenode answers with a redirect to a datanode,
//! which receives or serves the bytes. Redirects are followed by hand so the body is only
//! sent to the datanode.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{http_client, BlobStore};
use crate::error::{DmsError, DmsResult};
use crate::store::types::Metadata;

#[derive(Debug, Deserialize)]
struct RemoteExceptionBody {
    #[serde(rename = "RemoteException")]
    remote: RemoteException,
}

#[derive(Debug, Deserialize)]
struct RemoteException {
    #[serde(default)]
    exception: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct FileStatusBody {
    #[serde(rename = "FileStatus")]
    status: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct BooleanBody {
    boolean: bool,
}

/// Client for a WebHDFS namenode, acting as one user.
#[derive(Clone)]
pub struct WebHdfs {
    base: String,
    user_name: String,
    client: reqwest::Client,
}

impl WebHdfs {
    pub fn new(url: &str, user_name: &str, timeout_ms: u64) -> DmsResult<Self> {
        let parsed = Url::parse(url).map_err(|e| DmsError::user("webhdfs_url".to_string(), format!("invalid WebHDFS url '{}': {}", url, e)))?;
        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
            user_name: user_name.to_string(),
            client: http_client(timeout_ms, false)?,
        })
    }

    /// `{base}/webhdfs/v1/<path>?op=<op>&user.name=<user>[&extra...]`; each path segment is
    /// percent-encoded, separators are kept.
    fn op_url(&self, path: &str, op: &str, extra: &[(&str, &str)]) -> String {
        let encoded: Vec<String> = path
            .trim_start_matches('/')
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect();
        let mut url = format!(
            "{}/webhdfs/v1/{}?op={}&user.name={}",
            self.base,
            encoded.join("/"),
            op,
            urlencoding::encode(&self.user_name)
        );
        for (k, v) in extra {
            url.push('&');
            url.push_str(k);
            url.push('=');
            url.push_str(&urlencoding::encode(v));
        }
        url
    }

    async fn fail(resp: reqwest::Response, what: &str) -> DmsError {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        if let Ok(body) = serde_json::from_str::<RemoteExceptionBody>(&text) {
            let msg = format!("{} failed: {}: {}", what, body.remote.exception, body.remote.message);
            return match body.remote.exception.as_str() {
                "FileNotFoundException" => DmsError::not_found("webhdfs_not_found".to_string(), msg),
                "FileAlreadyExistsException" => DmsError::Backend { code: "webhdfs_exists".into(), message: msg, status: 409 },
                "AccessControlException" | "SecurityException" => DmsError::auth("webhdfs_auth".to_string(), msg),
                _ => DmsError::from_status("webhdfs", status, msg),
            };
        }
        DmsError::from_status("webhdfs", status, format!("{} failed with HTTP {}: {}", what, status, text.trim()))
    }

    fn redirect_target(resp: &reqwest::Response) -> Option<String> {
        if !resp.status().is_redirection() {
            return None;
        }
        resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
    }
}

#[async_trait]
impl BlobStore for WebHdfs {
    async fn put(&self, path: &str, content: &[u8], overwrite: bool) -> DmsResult<()> {
        let ow = if overwrite { "true" } else { "false" };
        let url = self.op_url(path, "CREATE", &[("overwrite", ow)]);
        let first = self.client.request(Method::PUT, &url).send().await?;
        let target = match Self::redirect_target(&first) {
            Some(loc) => loc,
            // Gateways that do not redirect (HttpFS) take the data on the same URL.
            None if first.status().is_success() => format!("{}&data=true", url),
            None => return Err(Self::fail(first, &format!("create {}", path)).await),
        };
        let resp = self
            .client
            .put(&target)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content.to_vec())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, &format!("write {}", path)).await);
        }
        debug!(target: "docvault::webhdfs", "wrote {} bytes to {}", content.len(), path);
        Ok(())
    }

    async fn get(&self, path: &str) -> DmsResult<Vec<u8>> {
        let url = self.op_url(path, "OPEN", &[]);
        let mut resp = self.client.get(&url).send().await?;
        if let Some(loc) = Self::redirect_target(&resp) {
            resp = self.client.get(&loc).send().await?;
        }
        if !resp.status().is_success() {
            return Err(Self::fail(resp, &format!("open {}", path)).await);
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn delete(&self, path: &str) -> DmsResult<bool> {
        let url = self.op_url(path, "DELETE", &[]);
        let resp = self.client.delete(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, &format!("delete {}", path)).await);
        }
        let body: BooleanBody = serde_json::from_slice(&resp.bytes().await?)?;
        Ok(body.boolean)
    }

    async fn stat(&self, path: &str) -> DmsResult<Metadata> {
        let url = self.op_url(path, "GETFILESTATUS", &[]);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, &format!("status of {}", path)).await);
        }
        let body: FileStatusBody = serde_json::from_slice(&resp.bytes().await?)?;
        Ok(flatten_status(body.status))
    }
}

fn flatten_status(status: serde_json::Map<String, Value>) -> Metadata {
    status
        .into_iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, s)
        })
        .collect()
}
