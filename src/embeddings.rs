//! Text-to-vector provider for the knowledge collection.
//!
//! One OpenAI-compatible implementation; the trait exists so the pipelines
//! can be exercised against a canned embedder in tests. Requests are chunked
//! to a fixed batch size and awaited sequentially.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Inputs per upstream request.
pub const EMBED_BATCH: usize = 64;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    fn dimensions(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(endpoint: String, api_key: String, model: String, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            dims,
        }
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let url = format!("{}/embeddings", self.endpoint);
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Assistant(format!(
                "Embedding API error {status}: {body}"
            )));
        }

        let result: EmbeddingResponse = response.json().await?;
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Assistant("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(EMBED_BATCH) {
            let batch = self.request_batch(chunk).await?;

            if batch.len() != chunk.len() {
                return Err(AppError::Assistant(format!(
                    "Embedding count mismatch: sent {}, got {}",
                    chunk.len(),
                    batch.len()
                )));
            }

            vectors.extend(batch);
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn embedder(endpoint: String) -> OpenAiEmbedder {
        OpenAiEmbedder::new(endpoint, "test-key".to_string(), "test-model".to_string(), 3)
    }

    fn vectors_for(request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let n = body["input"].as_array().unwrap().len();
        let data: Vec<_> = (0..n)
            .map(|i| json!({ "embedding": [i as f32, 0.0, 0.0] }))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
    }

    #[tokio::test]
    async fn embeds_a_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(vectors_for)
            .expect(1)
            .mount(&server)
            .await;

        let texts = vec!["one".to_string(), "two".to_string()];
        let vectors = embedder(server.uri()).embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn splits_input_at_the_batch_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(vectors_for)
            .expect(2)
            .mount(&server)
            .await;

        let texts: Vec<String> = (0..EMBED_BATCH + 1).map(|i| format!("text {i}")).collect();
        let vectors = embedder(server.uri()).embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), EMBED_BATCH + 1);
    }

    #[tokio::test]
    async fn upstream_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let result = embedder(server.uri()).embed("question").await;
        assert!(matches!(result, Err(AppError::Assistant(_))));
    }
}
