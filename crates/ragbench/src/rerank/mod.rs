//! Second-pass re-scoring of a bounded candidate pool.

use std::sync::Arc;

use async_trait::async_trait;
use ragbench_cache::{Cache, CacheKey, Namespace};
use tracing::debug;

use crate::{
    error::{RagError, RagResult},
    passage::{normalize_scores, sort_descending, RetrievalResult, ScoredPassage},
};

pub use self::cross_encoder::{CrossEncoder, HttpCrossEncoder};

mod cross_encoder;

/// Replaces a result's ranking with a fresh one over the same candidates.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn model_name(&self) -> &str;

    /// Re-score `result`, keep the best `count` passages and normalize their
    /// scores into `[0, 1]`. Upstream scores are discarded.
    async fn rerank(
        &self,
        result: RetrievalResult,
        count: usize,
        dataset_key: &str,
    ) -> RagResult<RetrievalResult>;
}

/// Cross-encoder reranker whose results are memoized under `reranker:` keys.
///
/// The key covers the sorted candidate ids, so any permutation of the same
/// candidate set hits the same entry.
pub struct CrossEncoderReranker {
    encoder: Arc<dyn CrossEncoder>,
    cache: Arc<Cache>,
}

impl CrossEncoderReranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>, cache: Arc<Cache>) -> Self {
        Self { encoder, cache }
    }

    pub fn cache_key(&self, result: &RetrievalResult, count: usize, dataset_key: &str) -> String {
        CacheKey::new(Namespace::Reranker)
            .field("model", self.encoder.model_name())
            .field("query", &result.query)
            .sorted_list("ids", result.passage_ids())
            .field("dataset_key", dataset_key)
            .field("count", count)
            .build()
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    fn model_name(&self) -> &str {
        self.encoder.model_name()
    }

    async fn rerank(
        &self,
        result: RetrievalResult,
        count: usize,
        dataset_key: &str,
    ) -> RagResult<RetrievalResult> {
        if result.is_empty() {
            return Ok(result);
        }

        let key = self.cache_key(&result, count, dataset_key);
        if let Some(passages) = self.cache.get::<Vec<ScoredPassage>>(&key).await? {
            debug!(namespace = %Namespace::Reranker, "Cache hit");
            return Ok(RetrievalResult::new(result.query, passages));
        }

        let pairs: Vec<(String, String)> = result
            .iter()
            .map(|scored| (result.query.clone(), scored.passage.context.clone()))
            .collect();
        let raw = self.encoder.predict(&pairs).await?;
        if raw.len() != pairs.len() {
            return Err(RagError::invalid_response(
                "rerank",
                format!("expected {} scores, got {}", pairs.len(), raw.len()),
            ));
        }
        debug!(
            model = self.encoder.model_name(),
            pool = pairs.len(),
            count,
            "Reranked candidates"
        );

        let RetrievalResult { query, passages } = result;
        let mut rescored: Vec<ScoredPassage> = passages
            .into_iter()
            .zip(raw)
            .map(|(scored, score)| ScoredPassage::new(scored.passage, score))
            .collect();
        sort_descending(&mut rescored);
        rescored.truncate(count);

        let normalized = normalize_scores(&rescored.iter().map(|p| p.score).collect::<Vec<_>>());
        for (scored, score) in rescored.iter_mut().zip(normalized) {
            scored.score = score;
        }

        self.cache.set(&key, &rescored).await?;
        Ok(RetrievalResult::new(query, rescored))
    }
}
