use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::{ConfigError, RagResult},
    passage::RetrievalResult,
    repository::Repository,
    rerank::Reranker,
    retrieval::Retriever,
};

pub const DEFAULT_RERANK_OVERFETCH: usize = 2;

/// Retrieval from one repository, optionally reranked.
///
/// With a reranker attached, `overfetch * size` candidates are requested and
/// reranked down to `size`.
pub struct RepositoryRetriever {
    repository: Arc<dyn Repository>,
    dataset_key: String,
    reranker: Option<Arc<dyn Reranker>>,
    overfetch: usize,
}

impl RepositoryRetriever {
    pub fn new(repository: Arc<dyn Repository>, dataset_key: impl Into<String>) -> Self {
        Self {
            repository,
            dataset_key: dataset_key.into(),
            reranker: None,
            overfetch: DEFAULT_RERANK_OVERFETCH,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Result<Self, ConfigError> {
        if overfetch == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.rerank_overfetch",
                message: "must be greater than 0".to_string(),
            });
        }
        self.overfetch = overfetch;
        Ok(self)
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }
}

#[async_trait]
impl Retriever for RepositoryRetriever {
    fn dataset_key(&self) -> &str {
        &self.dataset_key
    }

    async fn get_relevant_passages(&self, query: &str, size: usize) -> RagResult<RetrievalResult> {
        match &self.reranker {
            None => self.repository.find(query, &self.dataset_key, size).await,
            Some(reranker) => {
                let pool = size.saturating_mul(self.overfetch);
                let candidates = self.repository.find(query, &self.dataset_key, pool).await?;
                debug!(
                    repository = self.repository.identity(),
                    pool = candidates.len(),
                    size,
                    "Reranking candidate pool"
                );
                reranker.rerank(candidates, size, &self.dataset_key).await
            }
        }
    }

    async fn count_relevant_documents(&self, passage_ids: &[String]) -> RagResult<u64> {
        self.repository
            .count_relevant_documents(passage_ids, &self.dataset_key)
            .await
    }
}
