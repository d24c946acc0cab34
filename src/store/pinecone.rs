//! Pinecone serverless backend (REST control and data planes).

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::StoreConfig;

use super::{
    IndexEntry, IndexInfo, IndexSpec, Metric, Result, StoreError, StoreMatch, StoredRecord,
    VectorStore,
};

const API_VERSION: &str = "2024-07";

/// Page size for listing and fetching ids.
const LIST_PAGE_SIZE: usize = 100;
const READY_POLL_ATTEMPTS: usize = 60;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pinecone vector store client.
///
/// Index hosts are resolved through the control plane on first use and cached.
pub struct PineconeStore {
    client: Client,
    controller_url: String,
    max_retries: usize,
    hosts: RefCell<HashMap<String, String>>,
}

impl PineconeStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StoreError::Config("missing Pinecone API key".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key)
                .map_err(|_| StoreError::Config("invalid Pinecone API key".to_string()))?,
        );
        headers.insert(
            "X-Pinecone-API-Version",
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            controller_url: config.controller_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            hosts: RefCell::new(HashMap::new()),
        })
    }

    /// Whether a request that has already been retried `attempt` times may be
    /// sent again. `max_retries` counts retries, not attempts.
    fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_retries
    }

    /// Send a request, retrying rate limits, server errors and connection failures.
    fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match build().send() {
                Ok(resp) => {
                    let status = resp.status();
                    if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                        && self.can_retry(attempt)
                    {
                        attempt += 1;
                        log::warn!(
                            "Pinecone request failed ({}), retrying ({}/{})",
                            status,
                            attempt,
                            self.max_retries
                        );
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if (err.is_connect() || err.is_timeout()) && self.can_retry(attempt) {
                        attempt += 1;
                        log::warn!("Pinecone request error: {}, retrying", err);
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }

    fn describe(&self, name: &str) -> Result<Option<IndexDescription>> {
        let url = format!("{}/indexes/{}", self.controller_url, name);
        let resp = self.send(|| self.client.get(&url))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let description: IndexDescription = check(resp)?.json()?;
        self.hosts
            .borrow_mut()
            .insert(name.to_string(), description.host.clone());
        Ok(Some(description))
    }

    /// Poll a freshly created index until its data plane accepts writes.
    fn wait_until_ready(&self, name: &str) -> Result<()> {
        for _ in 0..READY_POLL_ATTEMPTS {
            let ready = self
                .describe(name)?
                .and_then(|d| d.status)
                .map(|s| s.ready)
                .unwrap_or(false);
            if ready {
                return Ok(());
            }
            log::debug!("Waiting for index '{}' to become ready", name);
            thread::sleep(READY_POLL_INTERVAL);
        }
        Err(StoreError::Server {
            status: 503,
            message: format!("index '{}' did not become ready", name),
        })
    }

    /// Base URL of the index's data plane.
    fn data_url(&self, index: &str) -> Result<String> {
        if let Some(host) = self.hosts.borrow().get(index) {
            return Ok(host_url(host));
        }
        let description = self
            .describe(index)?
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        Ok(host_url(&description.host))
    }

    /// One page of `/vectors/list`. The pagination token is opaque base64 and
    /// must be query-encoded.
    fn list_request(&self, base: &str, token: Option<&str>) -> RequestBuilder {
        let mut request = self
            .client
            .get(format!("{}/vectors/list", base))
            .query(&[("limit", LIST_PAGE_SIZE.to_string())]);
        if let Some(token) = token {
            request = request.query(&[("paginationToken", token)]);
        }
        request
    }

    fn list_ids(&self, index: &str) -> Result<Vec<String>> {
        let base = self.data_url(index)?;
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page: ListResponse =
                check(self.send(|| self.list_request(&base, token.as_deref()))?)?.json()?;
            ids.extend(page.vectors.into_iter().map(|v| v.id));

            match page.pagination.and_then(|p| p.next) {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }
}

impl VectorStore for PineconeStore {
    fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>> {
        let Some(description) = self.describe(name)? else {
            return Ok(None);
        };

        let url = format!("{}/describe_index_stats", host_url(&description.host));
        let stats: IndexStats =
            check(self.send(|| self.client.post(&url).json(&serde_json::json!({})))?)?.json()?;

        Ok(Some(IndexInfo {
            name: description.name,
            dimension: description.dimension,
            metric: Metric::parse(&description.metric).unwrap_or_default(),
            vector_count: stats.total_vector_count,
        }))
    }

    fn create_index(&mut self, spec: &IndexSpec) -> Result<()> {
        let url = format!("{}/indexes", self.controller_url);
        let body = CreateIndexRequest::from(spec);
        let resp = self.send(|| self.client.post(&url).json(&body))?;
        if resp.status() == StatusCode::CONFLICT {
            log::info!("Index '{}' already exists", spec.name);
            return Ok(());
        }
        check(resp)?;
        self.wait_until_ready(&spec.name)?;
        log::info!(
            "Created Pinecone index '{}' ({} dims, {}) in {}/{}",
            spec.name,
            spec.dimension,
            spec.metric.as_str(),
            spec.placement.cloud,
            spec.placement.region
        );
        Ok(())
    }

    fn upsert(&mut self, index: &str, entries: &[IndexEntry]) -> Result<usize> {
        let url = format!("{}/vectors/upsert", self.data_url(index)?);
        let body = UpsertRequest {
            vectors: entries
                .iter()
                .map(|e| VectorPayload {
                    id: &e.id,
                    values: &e.vector,
                    metadata: &e.metadata,
                })
                .collect(),
        };
        let resp: UpsertResponse =
            check(self.send(|| self.client.post(&url).json(&body))?)?.json()?;
        Ok(resp.upserted_count)
    }

    fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<StoreMatch>> {
        let url = format!("{}/query", self.data_url(index)?);
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata,
            include_values: false,
        };
        let resp: QueryResponse =
            check(self.send(|| self.client.post(&url).json(&body))?)?.json()?;
        Ok(resp.into_matches())
    }

    fn fetch_all(&self, index: &str) -> Result<Vec<StoredRecord>> {
        let ids = self.list_ids(index)?;
        let base = self.data_url(index)?;
        let mut records = Vec::with_capacity(ids.len());

        for batch in ids.chunks(LIST_PAGE_SIZE) {
            let query: Vec<(&str, &str)> = batch.iter().map(|id| ("ids", id.as_str())).collect();
            let url = format!("{}/vectors/fetch", base);
            let resp: FetchResponse =
                check(self.send(|| self.client.get(&url).query(&query))?)?.json()?;
            records.extend(resp.into_records());
        }

        Ok(records)
    }

    fn delete(&mut self, index: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}/vectors/delete", self.data_url(index)?);
        for batch in ids.chunks(1000) {
            let body = serde_json::json!({ "ids": batch });
            check(self.send(|| self.client.post(&url).json(&body))?)?;
        }
        Ok(())
    }

    fn delete_all(&mut self, index: &str) -> Result<()> {
        let url = format!("{}/vectors/delete", self.data_url(index)?);
        let body = serde_json::json!({ "deleteAll": true });
        check(self.send(|| self.client.post(&url).json(&body))?)?;
        Ok(())
    }
}

/// Map non-success statuses to store errors.
fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::AuthFailed),
        _ => Err(StoreError::Server {
            status: status.as_u16(),
            message: resp.text().unwrap_or_default(),
        }),
    }
}

fn host_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    dimension: usize,
    metric: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: usize,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'static str,
    spec: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    serverless: Serverless<'a>,
}

#[derive(Debug, Serialize)]
struct Serverless<'a> {
    cloud: &'a str,
    region: &'a str,
}

impl<'a> From<&'a IndexSpec> for CreateIndexRequest<'a> {
    fn from(spec: &'a IndexSpec) -> Self {
        Self {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric.as_str(),
            spec: ServerlessSpec {
                serverless: Serverless {
                    cloud: &spec.placement.cloud,
                    region: &spec.placement.region,
                },
            },
        }
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<VectorPayload<'a>>,
}

#[derive(Serialize)]
struct VectorPayload<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl QueryResponse {
    fn into_matches(self) -> Vec<StoreMatch> {
        self.matches
            .into_iter()
            .map(|m| StoreMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedId>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Debug, Deserialize)]
struct FetchedVector {
    id: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl FetchResponse {
    fn into_records(self) -> Vec<StoredRecord> {
        self.vectors
            .into_values()
            .map(|v| StoredRecord {
                id: v.id,
                metadata: v.metadata.unwrap_or_default(),
            })
            .collect()
    }
}
