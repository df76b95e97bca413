use std::sync::Arc;

use async_trait::async_trait;
use ragbench_cache::{Cache, CacheKey, Namespace};
use serde_json::json;
use tracing::debug;

use crate::{
    error::{RagError, RagResult},
    http::HttpEndpoint,
};

/// Turns text into embedding vectors.
#[async_trait]
pub trait Vectorizer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn get_vector(&self, text: &str) -> RagResult<Vec<f32>>;

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

/// Cosine of the angle between `a` and `b`; `0.0` for mismatched lengths,
/// empty input or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        0.0
    } else {
        dot / denominator
    }
}

/// Memoizes another vectorizer's embeddings under `vectorizer:` keys.
pub struct CachedVectorizer {
    inner: Arc<dyn Vectorizer>,
    cache: Arc<Cache>,
}

impl CachedVectorizer {
    pub fn new(inner: Arc<dyn Vectorizer>, cache: Arc<Cache>) -> Self {
        Self { inner, cache }
    }

    fn key(&self, text: &str) -> String {
        CacheKey::new(Namespace::Vectorizer)
            .field("model", self.inner.model_name())
            .field("text", text)
            .build()
    }
}

#[async_trait]
impl Vectorizer for CachedVectorizer {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn get_vector(&self, text: &str) -> RagResult<Vec<f32>> {
        let key = self.key(text);
        if let Some(vector) = self.cache.get::<Vec<f32>>(&key).await? {
            return Ok(vector);
        }
        let vector = self.inner.get_vector(text).await?;
        self.cache.set(&key, &vector).await?;
        Ok(vector)
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        self.inner.similarity(a, b)
    }
}

/// OpenAI-compatible `/embeddings` endpoint.
pub struct HttpVectorizer {
    endpoint: HttpEndpoint,
}

impl HttpVectorizer {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Vectorizer for HttpVectorizer {
    fn model_name(&self) -> &str {
        self.endpoint.model()
    }

    async fn get_vector(&self, text: &str) -> RagResult<Vec<f32>> {
        let body = json!({
            "model": self.endpoint.model(),
            "input": [text],
        });
        let response = self
            .endpoint
            .post_json("embeddings", "embeddings", &body)
            .await?;
        let vector = parse_embedding(&response)?;
        debug!(model = self.endpoint.model(), dimension = vector.len(), "Embedded text");
        Ok(vector)
    }
}

fn parse_embedding(response: &serde_json::Value) -> RagResult<Vec<f32>> {
    let values = response
        .get("data")
        .and_then(|data| data.get(0))
        .and_then(|item| item.get("embedding"))
        .and_then(|embedding| embedding.as_array())
        .ok_or_else(|| RagError::invalid_response("embeddings", "missing data[0].embedding"))?;
    values
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|number| number as f32)
                .ok_or_else(|| RagError::invalid_response("embeddings", "non-numeric component"))
        })
        .collect()
}
