//! Embedding-based nearest-neighbour search (Qdrant) and the vectorizers
//! that feed it.

use async_trait::async_trait;

use crate::{
    error::RagResult,
    passage::{Passage, RelevanceKey, ScoredPassage},
};

pub mod qdrant;
pub mod vectorizer;

pub use qdrant::QdrantBackend;
pub use vectorizer::{cosine_similarity, CachedVectorizer, HttpVectorizer, Vectorizer};

/// Vector store holding passages as points partitioned by dataset key.
///
/// Scores returned by [`search`](VectorBackend::search) are higher-is-better
/// raw similarities, best first.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    fn collection_name(&self) -> &str;

    /// Create the collection for vectors of `dimension` if it does not exist.
    async fn ensure_collection(&self, dimension: u64) -> RagResult<()>;

    async fn search(
        &self,
        vector: Vec<f32>,
        dataset_key: &str,
        limit: usize,
    ) -> RagResult<Vec<ScoredPassage>>;

    /// Store each passage with its vector under a fresh point id.
    async fn upsert(&self, points: Vec<(Passage, Vec<f32>)>) -> RagResult<()>;

    async fn delete_dataset(&self, dataset_key: &str) -> RagResult<()>;

    async fn count(&self, key: RelevanceKey, ids: &[String], dataset_key: &str) -> RagResult<u64>;
}
