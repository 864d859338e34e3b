//! Search index adapter for a Solr collection's `select` handler.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{error_body, http_client, SearchIndex};
use crate::error::{DmsError, DmsResult};
use crate::store::types::SearchResponse;

#[derive(Debug, Deserialize)]
struct SelectBody {
    response: SelectResponse,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    docs: Vec<Value>,
}

/// Search adapter for one Solr collection (`/solr/<collection>/select`).
#[derive(Clone)]
pub struct SolrIndex {
    select_url: String,
    client: reqwest::Client,
}

impl SolrIndex {
    pub fn new(url: &str, collection: &str, timeout_ms: u64) -> DmsResult<Self> {
        let parsed = Url::parse(url).map_err(|e| DmsError::user("solr_url".to_string(), format!("invalid Solr url '{}': {}", url, e)))?;
        let base = parsed.as_str().trim_end_matches('/');
        Ok(Self {
            select_url: format!("{}/solr/{}/select", base, urlencoding::encode(collection)),
            client: http_client(timeout_ms, true)?,
        })
    }

    pub fn select_url(&self) -> &str { &self.select_url }
}

#[async_trait]
impl SearchIndex for SolrIndex {
    async fn query(&self, text: &str) -> DmsResult<SearchResponse> {
        let resp = self
            .client
            .get(&self.select_url)
            .query(&[("q", text), ("wt", "json")])
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = error_body(resp).await;
            return Err(DmsError::from_status("solr", status, format!("select failed with HTTP {}: {}", status, body)));
        }
        let body: SelectBody = serde_json::from_slice(&resp.bytes().await?)?;
        debug!(target: "docvault::solr", "q='{}' numFound={}", text, body.response.num_found);
        Ok(SearchResponse { count: body.response.num_found, docs: body.response.docs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_url_shape() {
        let s = SolrIndex::new("http://solr:8983/", "dms docs", 0).unwrap();
        assert_eq!(s.select_url(), "http://solr:8983/solr/dms%20docs/select");
    }

    #[test]
    fn parses_select_body() {
        let raw = r#"{"responseHeader":{"status":0},"response":{"numFound":2,"start":0,"docs":[{"id":"a"},{"id":"b"}]}}"#;
        let body: SelectBody = serde_json::from_str(raw).unwrap();
        assert_eq!(body.response.num_found, 2);
        assert_eq!(body.response.docs.len(), 2);
    }
}
