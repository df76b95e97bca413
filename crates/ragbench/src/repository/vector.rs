use std::sync::Arc;

use async_trait::async_trait;
use ragbench_cache::{Cache, CacheKey, Namespace};
use tracing::{debug, info};

use crate::{
    error::RagResult,
    models::EmbeddingModel,
    passage::{Passage, RelevanceKey, RetrievalResult},
    repository::{cached_count, cached_find, Repository, RepositoryKind},
    vector::{VectorBackend, Vectorizer},
};

/// Nearest-neighbour repository. Queries and passages are embedded with the
/// model's query and passage prefixes respectively.
pub struct VectorRepository {
    backend: Arc<dyn VectorBackend>,
    vectorizer: Arc<dyn Vectorizer>,
    model: EmbeddingModel,
    cache: Arc<Cache>,
    relevance_key: Option<RelevanceKey>,
}

impl VectorRepository {
    /// Creates the backing collection if it does not exist yet.
    pub async fn new(
        backend: Arc<dyn VectorBackend>,
        vectorizer: Arc<dyn Vectorizer>,
        model: EmbeddingModel,
        cache: Arc<Cache>,
    ) -> RagResult<Self> {
        backend.ensure_collection(model.dimension).await?;
        info!(
            collection = backend.collection_name(),
            model = model.name,
            "Vector repository ready"
        );
        Ok(Self {
            backend,
            vectorizer,
            model,
            cache,
            relevance_key: None,
        })
    }

    pub fn with_relevance_key(mut self, key: RelevanceKey) -> Self {
        self.relevance_key = Some(key);
        self
    }

    pub fn model(&self) -> &EmbeddingModel {
        &self.model
    }

    pub fn vectorizer(&self) -> &Arc<dyn Vectorizer> {
        &self.vectorizer
    }

    fn relevance_key(&self, dataset_key: &str) -> RelevanceKey {
        self.relevance_key
            .unwrap_or_else(|| RelevanceKey::for_dataset_key(dataset_key))
    }

    pub fn find_key(&self, query: &str, dataset_key: &str, size: usize) -> String {
        CacheKey::new(Namespace::Prompt)
            .field("model", self.model.name)
            .field("dataset_key", dataset_key)
            .field("query", self.model.prefixed_query(query))
            .field("collection", self.backend.collection_name())
            .field("size", size)
            .build()
    }

    /// Store passages whose embeddings were computed elsewhere.
    pub async fn insert_many_with_vectors(&self, points: Vec<(Passage, Vec<f32>)>) -> RagResult<()> {
        self.backend.upsert(points).await
    }

    async fn embed_passage(&self, passage: &Passage) -> RagResult<Vec<f32>> {
        self.vectorizer
            .get_vector(&self.model.prefixed_passage(&passage.context))
            .await
    }
}

#[async_trait]
impl Repository for VectorRepository {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Vector
    }

    fn identity(&self) -> &str {
        self.backend.collection_name()
    }

    async fn find(
        &self,
        query: &str,
        dataset_key: &str,
        size: usize,
    ) -> RagResult<RetrievalResult> {
        let key = self.find_key(query, dataset_key, size);
        cached_find(&self.cache, key, query, || async {
            let vector = self
                .vectorizer
                .get_vector(&self.model.prefixed_query(query))
                .await?;
            debug!(
                collection = self.backend.collection_name(),
                dataset_key,
                size,
                "Vector query issued"
            );
            self.backend.search(vector, dataset_key, size).await
        })
        .await
    }

    async fn insert_one(&self, passage: Passage) -> RagResult<()> {
        let vector = self.embed_passage(&passage).await?;
        self.backend.upsert(vec![(passage, vector)]).await
    }

    async fn insert_many(&self, passages: Vec<Passage>) -> RagResult<()> {
        let mut points = Vec::with_capacity(passages.len());
        for passage in passages {
            let vector = self.embed_passage(&passage).await?;
            points.push((passage, vector));
        }
        self.backend.upsert(points).await
    }

    async fn delete(&self, dataset_key: &str) -> RagResult<()> {
        self.backend.delete_dataset(dataset_key).await
    }

    async fn count_relevant_documents(
        &self,
        passage_ids: &[String],
        dataset_key: &str,
    ) -> RagResult<u64> {
        let relevance = self.relevance_key(dataset_key);
        let key = CacheKey::new(Namespace::Count)
            .field("collection", self.backend.collection_name())
            .field("relevance", relevance.field_path())
            .sorted_list("ids", passage_ids)
            .field("dataset_key", dataset_key)
            .build();
        cached_count(&self.cache, key, || {
            self.backend.count(relevance, passage_ids, dataset_key)
        })
        .await
    }
}
