//! Embedding provider: an OpenAI-compatible `/v1/embeddings` client.
//!
//! Cache-then-limiter shape: an in-memory cache for repeated queries in
//! front of a bounded-concurrency `reqwest` client, OpenAI-format request
//! and response DTOs. There is no blending of the current turn's embedding
//! with prior turns' — each query is embedded on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::utils::Limiters;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct OpenAiEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
    batch_size: usize,
    cache: Arc<RwLock<HashMap<String, Vec<f32>>>>,
    limiters: Arc<Limiters>,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        base_url: String,
        model: String,
        dimension: usize,
        api_key: Option<String>,
        batch_size: usize,
        timeout_ms: u64,
        limiters: Arc<Limiters>,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            model,
            dimension,
            api_key,
            batch_size,
            cache: Arc::new(RwLock::new(HashMap::new())),
            limiters,
        }
    }

    async fn embed_uncached(&self, text: &str) -> Result<Vec<f32>> {
        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.embedding.clone(),
            self.limiters.acquire_timeout,
            "embedding",
        )
        .await
        .map_err(|e| CoreError::EmbeddingFailed(e.to_string()))?;

        debug!(wait_ms = wait.as_millis() as u64, op = "embedding", "wait_queue");
        let exec_start = Instant::now();

        let request = EmbeddingRequest {
            input: text.to_string(),
            model: self.model.clone(),
        };
        let url = format!("{}/v1/embeddings", self.base_url);

        let mut request_builder = self.client.post(&url);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = request_builder
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::EmbeddingFailed(format!("request failed: {e}")))?;

        debug!(exec_ms = exec_start.elapsed().as_millis() as u64, op = "embedding", "exec");

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::EmbeddingFailed(format!("{status}: {body}")));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoreError::EmbeddingFailed(format!("invalid response body: {e}")))?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::EmbeddingFailed("empty data array".to_string()))?
            .embedding;

        if embedding.len() != self.dimension {
            return Err(CoreError::EmbeddingFailed(format!(
                "dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        {
            let cache = self.cache.read().await;
            if let Some(embedding) = cache.get(text) {
                return Ok(embedding.clone());
            }
        }

        let embedding = self.embed_uncached(text).await?;

        let mut cache = self.cache.write().await;
        cache.insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        use futures::future::join_all;

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let futures: Vec<_> = batch.iter().map(|t| self.embed(t)).collect();
            for result in join_all(futures).await {
                all.push(result?);
            }
        }
        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
