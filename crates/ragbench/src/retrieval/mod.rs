//! Retrievers: single-repository (optionally reranked) and hybrid fusion.

use async_trait::async_trait;

use crate::{error::RagResult, passage::RetrievalResult};

pub use self::{
    hybrid::{HybridRetriever, HybridRetrieverBuilder, DEFAULT_ALPHA},
    single::{RepositoryRetriever, DEFAULT_RERANK_OVERFETCH},
};

mod hybrid;
mod single;

/// Answers queries against one dataset partition.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn dataset_key(&self) -> &str;

    async fn get_relevant_passages(&self, query: &str, size: usize) -> RagResult<RetrievalResult>;

    /// Indexed passages matching `passage_ids`, the Recall@k denominator.
    async fn count_relevant_documents(&self, passage_ids: &[String]) -> RagResult<u64>;
}
