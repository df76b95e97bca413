use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::{ConfigError, RagResult},
    passage::{sort_descending, RetrievalResult, ScoredPassage},
    repository::{Repository, RepositoryKind},
    rerank::Reranker,
    retrieval::Retriever,
};

pub const DEFAULT_ALPHA: f32 = 0.5;

/// Weighted fusion of a lexical and a vector repository.
///
/// Each side's normalized scores are scaled (lexical by `alpha`, vector by
/// `1 - alpha`) and summed per passage. A side whose weight is zero is not
/// queried at all, so `alpha = 1` reproduces the lexical ranking and
/// `alpha = 0` the vector ranking.
pub struct HybridRetriever {
    lexical: Arc<dyn Repository>,
    vector: Arc<dyn Repository>,
    dataset_key: String,
    alpha: f32,
    reranker: Option<Arc<dyn Reranker>>,
}

impl HybridRetriever {
    pub fn builder() -> HybridRetrieverBuilder {
        HybridRetrieverBuilder::default()
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    async fn find_weighted(
        &self,
        repository: &Arc<dyn Repository>,
        weight: f32,
        query: &str,
        size: usize,
    ) -> RagResult<RetrievalResult> {
        if weight == 0.0 {
            return Ok(RetrievalResult::empty(query));
        }
        repository.find(query, &self.dataset_key, size).await
    }

    fn fuse(&self, lexical: RetrievalResult, vector: RetrievalResult) -> Vec<ScoredPassage> {
        let mut fused: Vec<ScoredPassage> = Vec::with_capacity(lexical.len() + vector.len());
        let mut positions: HashMap<(String, String), usize> = HashMap::new();

        for (result, weight) in [(lexical, self.alpha), (vector, 1.0 - self.alpha)] {
            if weight == 0.0 {
                continue;
            }
            for scored in result.passages {
                let contribution = scored.score * weight;
                let identity = (scored.passage.id.clone(), scored.passage.dataset_key.clone());
                match positions.get(&identity) {
                    Some(&index) => fused[index].score += contribution,
                    None => {
                        positions.insert(identity, fused.len());
                        fused.push(ScoredPassage::new(scored.passage, contribution));
                    }
                }
            }
        }

        sort_descending(&mut fused);
        fused
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    fn dataset_key(&self) -> &str {
        &self.dataset_key
    }

    async fn get_relevant_passages(&self, query: &str, size: usize) -> RagResult<RetrievalResult> {
        let lexical = self.find_weighted(&self.lexical, self.alpha, query, size).await?;
        let vector = self
            .find_weighted(&self.vector, 1.0 - self.alpha, query, size)
            .await?;
        debug!(
            lexical = lexical.len(),
            vector = vector.len(),
            alpha = self.alpha,
            "Fusing rankings"
        );

        let mut fused = self.fuse(lexical, vector);
        fused.truncate(size);
        let result = RetrievalResult::new(query, fused);

        match &self.reranker {
            Some(reranker) => reranker.rerank(result, size, &self.dataset_key).await,
            None => Ok(result),
        }
    }

    /// Both repositories index the same corpus; the lexical side answers.
    async fn count_relevant_documents(&self, passage_ids: &[String]) -> RagResult<u64> {
        self.lexical
            .count_relevant_documents(passage_ids, &self.dataset_key)
            .await
    }
}

#[derive(Default)]
pub struct HybridRetrieverBuilder {
    lexical: Option<Arc<dyn Repository>>,
    vector: Option<Arc<dyn Repository>>,
    dataset_key: Option<String>,
    alpha: Option<f32>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl HybridRetrieverBuilder {
    pub fn lexical(mut self, repository: Arc<dyn Repository>) -> Self {
        self.lexical = Some(repository);
        self
    }

    pub fn vector(mut self, repository: Arc<dyn Repository>) -> Self {
        self.vector = Some(repository);
        self
    }

    pub fn dataset_key(mut self, dataset_key: impl Into<String>) -> Self {
        self.dataset_key = Some(dataset_key.into());
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn build(self) -> Result<HybridRetriever, ConfigError> {
        let lexical = self
            .lexical
            .ok_or(ConfigError::MissingParameter { name: "lexical" })?;
        let vector = self
            .vector
            .ok_or(ConfigError::MissingParameter { name: "vector" })?;
        let dataset_key = self
            .dataset_key
            .ok_or(ConfigError::MissingParameter { name: "dataset_key" })?;
        let alpha = self.alpha.unwrap_or(DEFAULT_ALPHA);

        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::InvalidAlpha { alpha });
        }
        if lexical.kind() != RepositoryKind::Lexical {
            return Err(ConfigError::Invalid {
                field: "lexical",
                message: format!("expected a lexical repository, got {}", lexical.kind()),
            });
        }
        if vector.kind() != RepositoryKind::Vector {
            return Err(ConfigError::Invalid {
                field: "vector",
                message: format!("expected a vector repository, got {}", vector.kind()),
            });
        }

        Ok(HybridRetriever {
            lexical,
            vector,
            dataset_key,
            alpha,
            reranker: self.reranker,
        })
    }
}
