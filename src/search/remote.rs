//! Remote text encoder for OpenAI-compatible `/embeddings` endpoints.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EncodingError, EncodingFailure, Result, SeekError};
use crate::search::embeddings::{Encoder, Modality};

/// Blocking embeddings client
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dims: usize,
    max_retries: usize,
    name: String,
}

impl HttpEmbedder {
    /// `dims` is the vector length the endpoint is expected to return.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        dims: usize,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(SeekError::Config("missing embedding model name".to_string()));
        }
        if base_url.trim().is_empty() {
            return Err(SeekError::Config("missing embedding endpoint".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| SeekError::Config("invalid embedding API key".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| SeekError::Config(format!("build HTTP client: {err}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dims,
            max_retries: max_retries.max(1),
            name: format!("http:{model}"),
        })
    }

    fn request_once(&self, input: &str) -> std::result::Result<Vec<f32>, Attempt> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [input],
            dimensions: Some(self.dims),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| {
                let kind = if err.is_timeout() {
                    EncodingFailure::Timeout
                } else {
                    EncodingFailure::NetworkUnavailable
                };
                Attempt::retryable(kind, err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let detail = format!("embedding request failed ({status}): {body}");
            return Err(if should_retry(status) {
                Attempt::retryable(EncodingFailure::NetworkUnavailable, detail)
            } else {
                Attempt::fatal(EncodingFailure::Backend, detail)
            });
        }

        let parsed: EmbeddingResponse = response.json().map_err(|err| {
            Attempt::fatal(EncodingFailure::Backend, format!("parse embedding response: {err}"))
        })?;
        parsed
            .data
            .into_iter()
            .min_by_key(|entry| entry.index)
            .map(|entry| entry.embedding)
            .ok_or_else(|| Attempt::fatal(EncodingFailure::Backend, "empty embedding response"))
    }
}

struct Attempt {
    kind: EncodingFailure,
    detail: String,
    retryable: bool,
}

impl Attempt {
    fn retryable(kind: EncodingFailure, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            retryable: true,
        }
    }

    fn fatal(kind: EncodingFailure, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            retryable: false,
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(100 * (1 << capped))
}

impl Encoder for HttpEmbedder {
    fn modality(&self) -> Modality {
        Modality::Text
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, input: &str) -> std::result::Result<Vec<f32>, EncodingError> {
        if input.trim().is_empty() {
            return Err(EncodingError::empty_input(Modality::Text));
        }
        let mut attempt = 0usize;
        loop {
            match self.request_once(input) {
                Ok(vector) => return Ok(vector),
                Err(failure) if failure.retryable && attempt + 1 < self.max_retries => {
                    attempt += 1;
                    debug!(attempt, detail = %failure.detail, "retrying embedding request");
                    thread::sleep(retry_backoff(attempt));
                }
                Err(failure) => {
                    return Err(EncodingError::new(Modality::Text, failure.kind, failure.detail));
                }
            }
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
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
    index: usize,
}
