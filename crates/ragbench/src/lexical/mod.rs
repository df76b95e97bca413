//! BM25 lexical search over passages, built on Tantivy.

use async_trait::async_trait;

use crate::{
    error::RagResult,
    passage::{Passage, RelevanceKey, ScoredPassage},
};

pub use self::{
    errors::{LexicalError, LexicalResult},
    index::TantivyBackend,
    schema::PassageSchema,
};

mod errors;
mod index;
mod schema;

/// Full-text search engine holding passages partitioned by dataset key.
///
/// Scores returned by [`search`](LexicalBackend::search) are raw engine
/// scores, best first.
#[async_trait]
pub trait LexicalBackend: Send + Sync {
    /// Name of the index (analyzer configuration) this backend serves.
    fn index_name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        dataset_key: &str,
        limit: usize,
    ) -> RagResult<Vec<ScoredPassage>>;

    async fn insert(&self, passages: &[Passage]) -> RagResult<()>;

    async fn delete_dataset(&self, dataset_key: &str) -> RagResult<()>;

    async fn count(&self, key: RelevanceKey, ids: &[String], dataset_key: &str) -> RagResult<u64>;
}
