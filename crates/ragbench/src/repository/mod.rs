//! Uniform find/insert/count contract over the lexical and vector backends.
//!
//! Both variants share one cache-normalize-materialize path, which is what
//! makes their scores fusable in [`HybridRetriever`](crate::retrieval::HybridRetriever).

use std::{fmt, future::Future};

use async_trait::async_trait;
use ragbench_cache::{Cache, Namespace};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::RagResult,
    passage::{normalize_scores, Passage, RetrievalResult, ScoredPassage},
};

pub use self::{lexical::LexicalRepository, vector::VectorRepository};

mod lexical;
mod vector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    Lexical,
    Vector,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Lexical => f.write_str("lexical"),
            RepositoryKind::Vector => f.write_str("vector"),
        }
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    fn kind(&self) -> RepositoryKind;

    /// Backend identity used in cache keys (index or collection name).
    fn identity(&self) -> &str;

    /// Up to `size` passages of `dataset_key` ranked for `query`, scores
    /// min-max normalized into `[0, 1]`. Cached; an empty result is not.
    async fn find(&self, query: &str, dataset_key: &str, size: usize)
        -> RagResult<RetrievalResult>;

    async fn insert_one(&self, passage: Passage) -> RagResult<()>;

    async fn insert_many(&self, passages: Vec<Passage>) -> RagResult<()>;

    /// Remove every passage of the `dataset_key` partition.
    async fn delete(&self, dataset_key: &str) -> RagResult<()>;

    /// Indexed passages of `dataset_key` matching any of `passage_ids`.
    async fn count_relevant_documents(
        &self,
        passage_ids: &[String],
        dataset_key: &str,
    ) -> RagResult<u64>;
}

/// Look `key` up in `cache`; on a miss run `search` once, normalize its raw
/// scores and store the result.
pub(crate) async fn cached_find<F, Fut>(
    cache: &Cache,
    key: String,
    query: &str,
    search: F,
) -> RagResult<RetrievalResult>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RagResult<Vec<ScoredPassage>>>,
{
    if let Some(passages) = cache.get::<Vec<ScoredPassage>>(&key).await? {
        debug!(namespace = ?Namespace::of_key(&key), "Cache hit");
        return Ok(RetrievalResult::new(query, passages));
    }
    debug!(namespace = ?Namespace::of_key(&key), "Cache miss");

    let mut hits = search().await?;
    if hits.is_empty() {
        return Ok(RetrievalResult::empty(query));
    }

    let normalized = normalize_scores(&hits.iter().map(|hit| hit.score).collect::<Vec<_>>());
    for (hit, score) in hits.iter_mut().zip(normalized) {
        hit.score = score;
    }
    cache.set(&key, &hits).await?;
    Ok(RetrievalResult::new(query, hits))
}

pub(crate) async fn cached_count<F, Fut>(cache: &Cache, key: String, count: F) -> RagResult<u64>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RagResult<u64>>,
{
    if let Some(total) = cache.get::<u64>(&key).await? {
        return Ok(total);
    }
    let total = count().await?;
    cache.set(&key, &total).await?;
    Ok(total)
}
