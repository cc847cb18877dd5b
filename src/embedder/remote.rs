//! Blocking client for OpenAI-compatible embedding endpoints.
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{Embedder, EmbedderError};

/// Talks to a `POST {endpoint}/embeddings` API with the usual
/// `{model, input: [..]}` request shape.
///
/// The vector dimensionality is declared up front in configuration; a backend
/// answering with a different shape surfaces as a dimension mismatch when the
/// vectors reach the index.
pub struct RemoteEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl RemoteEmbedder {
    pub fn new(
        base_url: &str,
        model: String,
        dimensions: usize,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        anyhow::ensure!(dimensions > 0, "embedding dimensions must be positive");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).context("invalid embedding API key")?,
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }

    fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| EmbedderError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedderError::Request(format!("{status}: {text}")));
        }

        let mut parsed: EmbeddingResponse = resp
            .json()
            .map_err(|e| EmbedderError::BadResponse(e.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(EmbedderError::CountMismatch {
                want: inputs.len(),
                got: parsed.data.len(),
            });
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

impl Embedder for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut batch = self.request(&[text])?;
        Ok(batch.remove(0))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
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

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_embed_batch_orders_by_index() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]},
                ]
            }));
        });

        let embedder = RemoteEmbedder::new(
            &server.url("/v1"),
            "test-model".to_string(),
            2,
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let batch = embedder.embed_batch(&["first", "second"]).unwrap();
        assert_eq!(batch[0], vec![1.0, 0.0]);
        assert_eq!(batch[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_count_mismatch_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200)
                .json_body(serde_json::json!({"data": [{"index": 0, "embedding": [1.0]}]}));
        });

        let embedder = RemoteEmbedder::new(
            &server.url("/v1"),
            "test-model".to_string(),
            1,
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        match embedder.embed_batch(&["a", "b"]) {
            Err(EmbedderError::CountMismatch { want: 2, got: 1 }) => {}
            other => panic!("expected count mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_http_error_propagates() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(503).body("overloaded");
        });

        let embedder = RemoteEmbedder::new(
            &server.url("/v1"),
            "test-model".to_string(),
            4,
            Some("secret"),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(matches!(
            embedder.embed("q"),
            Err(EmbedderError::Request(_))
        ));
    }
}
