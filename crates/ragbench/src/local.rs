//! In-process embedding and cross-encoder inference via fastembed.
//!
//! Models run on the blocking thread pool; each model instance is guarded
//! by a mutex because inference needs exclusive access.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, RerankInitOptions, RerankerModel, TextEmbedding, TextInitOptions, TextRerank,
};
use parking_lot::Mutex;
use tracing::info;

use crate::{
    error::{RagError, RagResult},
    rerank::CrossEncoder,
    vector::Vectorizer,
};

pub struct FastEmbedVectorizer {
    name: String,
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedVectorizer {
    /// Load `model`, reporting it under the catalogue `name`.
    pub fn try_new(model: EmbeddingModel, name: impl Into<String>) -> RagResult<Self> {
        let name = name.into();
        let embedding = TextEmbedding::try_new(TextInitOptions::new(model))
            .map_err(|err| RagError::backend("fastembed.load", err))?;
        info!(model = %name, "Loaded local embedding model");
        Ok(Self {
            name,
            model: Arc::new(Mutex::new(embedding)),
        })
    }

    pub fn multilingual_e5_large() -> RagResult<Self> {
        Self::try_new(
            EmbeddingModel::MultilingualE5Large,
            "intfloat/multilingual-e5-large",
        )
    }
}

#[async_trait]
impl Vectorizer for FastEmbedVectorizer {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn get_vector(&self, text: &str) -> RagResult<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let embeddings = tokio::task::spawn_blocking(move || model.lock().embed(vec![text], None))
            .await
            .map_err(|err| RagError::backend("fastembed.join", err))?
            .map_err(|err| RagError::backend("fastembed.embed", err))?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::invalid_response("fastembed.embed", "no embedding returned"))
    }
}

pub struct FastEmbedCrossEncoder {
    name: String,
    model: Arc<Mutex<TextRerank>>,
}

impl FastEmbedCrossEncoder {
    pub fn try_new(model: RerankerModel, name: impl Into<String>) -> RagResult<Self> {
        let name = name.into();
        let reranker = TextRerank::try_new(RerankInitOptions::new(model))
            .map_err(|err| RagError::backend("fastembed.load", err))?;
        info!(model = %name, "Loaded local cross-encoder");
        Ok(Self {
            name,
            model: Arc::new(Mutex::new(reranker)),
        })
    }

    pub fn bge_reranker_v2_m3() -> RagResult<Self> {
        Self::try_new(RerankerModel::BGERerankerV2M3, "BAAI/bge-reranker-v2-m3")
    }
}

#[async_trait]
impl CrossEncoder for FastEmbedCrossEncoder {
    fn model_name(&self) -> &str {
        &self.name
    }

    /// One rerank call per pair keeps scores aligned with pair order.
    async fn predict(&self, pairs: &[(String, String)]) -> RagResult<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let pairs = pairs.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock();
            let mut scores = vec![f32::MIN; pairs.len()];
            for (offset, (query, document)) in pairs.iter().enumerate() {
                let ranked = model
                    .rerank(query.as_str(), vec![document.as_str()], false, None)
                    .map_err(|err| RagError::backend("fastembed.rerank", err))?;
                if let Some(first) = ranked.first() {
                    scores[offset] = first.score;
                }
            }
            Ok(scores)
        })
        .await
        .map_err(|err| RagError::backend("fastembed.join", err))?
    }
}
