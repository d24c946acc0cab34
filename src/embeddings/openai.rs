//! Blocking client for OpenAI-compatible `/embeddings` endpoints
//! (OpenAI, Ollama, LM Studio).

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

use super::{Embedder, EmbeddingError, Result};

pub struct OpenAiCompatibleEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding model name".to_string()));
        }
        let base_url = config.base_url();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(EmbeddingError::Config(format!(
                "embedding base URL must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| EmbeddingError::Config("invalid embedding API key".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        } else if config.provider.requires_api_key() {
            return Err(EmbeddingError::Config("missing embedding API key".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_retries: config.max_retries,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Whether a request that has already been retried `attempt` times may be
    /// sent again. `max_retries` counts retries, not attempts.
    fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_retries
    }

    /// Send one request of at most `batch_size` inputs.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let mut attempt = 0usize;
        loop {
            match self.client.post(&self.endpoint).json(&request).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = resp.json()?;
                        return parsed.into_embeddings(inputs.len());
                    }

                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && self.can_retry(attempt) {
                        attempt += 1;
                        log::warn!(
                            "Embedding request failed ({}), retrying ({}/{})",
                            status,
                            attempt,
                            self.max_retries
                        );
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(EmbeddingError::Server {
                        status: status.as_u16(),
                        message: body,
                    });
                }
                Err(err) => {
                    if (err.is_connect() || err.is_timeout()) && self.can_retry(attempt) {
                        attempt += 1;
                        log::warn!("Embedding request error: {}, retrying", err);
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

impl Embedder for OpenAiCompatibleEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            log::debug!("Embedding batch of {} texts with {}", batch.len(), self.model);
            vectors.extend(self.embed_batch(batch)?);
        }
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl EmbeddingResponse {
    fn into_embeddings(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            return Err(EmbeddingError::Response(format!(
                "{} embeddings returned for {} inputs",
                self.data.len(),
                expected
            )));
        }
        self.data.sort_by_key(|entry| entry.index);
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}
