use std::sync::Arc;

use async_trait::async_trait;
use ragbench_cache::{Cache, CacheKey, Namespace};
use tracing::debug;

use crate::{
    error::RagResult,
    lexical::LexicalBackend,
    passage::{Passage, RelevanceKey, RetrievalResult},
    repository::{cached_count, cached_find, Repository, RepositoryKind},
};

/// Full-text repository; the query goes to the engine verbatim.
pub struct LexicalRepository {
    backend: Arc<dyn LexicalBackend>,
    cache: Arc<Cache>,
    relevance_key: Option<RelevanceKey>,
}

impl LexicalRepository {
    pub fn new(backend: Arc<dyn LexicalBackend>, cache: Arc<Cache>) -> Self {
        Self {
            backend,
            cache,
            relevance_key: None,
        }
    }

    /// Count by `key` instead of the per-dataset convention.
    pub fn with_relevance_key(mut self, key: RelevanceKey) -> Self {
        self.relevance_key = Some(key);
        self
    }

    fn relevance_key(&self, dataset_key: &str) -> RelevanceKey {
        self.relevance_key
            .unwrap_or_else(|| RelevanceKey::for_dataset_key(dataset_key))
    }

    pub fn find_key(&self, query: &str, dataset_key: &str, size: usize) -> String {
        CacheKey::new(Namespace::Query)
            .field("index", self.backend.index_name())
            .field("dataset_key", dataset_key)
            .field("query", query)
            .field("size", size)
            .build()
    }
}

#[async_trait]
impl Repository for LexicalRepository {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Lexical
    }

    fn identity(&self) -> &str {
        self.backend.index_name()
    }

    async fn find(
        &self,
        query: &str,
        dataset_key: &str,
        size: usize,
    ) -> RagResult<RetrievalResult> {
        let key = self.find_key(query, dataset_key, size);
        cached_find(&self.cache, key, query, || async {
            debug!(index = self.backend.index_name(), dataset_key, size, "Lexical query issued");
            self.backend.search(query, dataset_key, size).await
        })
        .await
    }

    async fn insert_one(&self, passage: Passage) -> RagResult<()> {
        self.backend.insert(std::slice::from_ref(&passage)).await
    }

    async fn insert_many(&self, passages: Vec<Passage>) -> RagResult<()> {
        self.backend.insert(&passages).await
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
            .field("index", self.backend.index_name())
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

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::{config::LexicalSettings, lexical::TantivyBackend};

    #[derive(Default)]
    struct FakeIndex {
        passages: Mutex<Vec<Passage>>,
        searches: AtomicUsize,
        counts: AtomicUsize,
    }

    #[async_trait]
    impl LexicalBackend for FakeIndex {
        fn index_name(&self) -> &str {
            "fake_index"
        }

        async fn search(
            &self,
            query: &str,
            dataset_key: &str,
            limit: usize,
        ) -> RagResult<Vec<crate::passage::ScoredPassage>> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .passages
                .lock()
                .iter()
                .filter(|p| p.dataset_key == dataset_key && p.context.contains(query))
                .take(limit)
                .enumerate()
                .map(|(rank, p)| crate::passage::ScoredPassage::new(p.clone(), 10.0 - rank as f32))
                .collect())
        }

        async fn insert(&self, passages: &[Passage]) -> RagResult<()> {
            self.passages.lock().extend_from_slice(passages);
            Ok(())
        }

        async fn delete_dataset(&self, dataset_key: &str) -> RagResult<()> {
            self.passages.lock().retain(|p| p.dataset_key != dataset_key);
            Ok(())
        }

        async fn count(
            &self,
            key: RelevanceKey,
            ids: &[String],
            dataset_key: &str,
        ) -> RagResult<u64> {
            self.counts.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .passages
                .lock()
                .iter()
                .filter(|p| p.dataset_key == dataset_key && key.matches(p, ids))
                .count() as u64)
        }
    }

    fn passage(id: &str, context: &str) -> Passage {
        Passage::new(id, "", context, 0, "clarin-pl/poquad", "clarin-pl-poquad-500")
    }

    #[tokio::test]
    async fn second_find_is_served_from_cache() {
        let backend = Arc::new(FakeIndex::default());
        let repository = LexicalRepository::new(backend.clone(), Arc::new(Cache::in_memory()));
        repository
            .insert_many(vec![passage("1", "stolica Polski"), passage("2", "stolica Czech")])
            .await
            .unwrap();

        let first = repository.find("stolica", "clarin-pl-poquad-500", 10).await.unwrap();
        let second = repository.find("stolica", "clarin-pl-poquad-500", 10).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.scores(), vec![1.0, 0.0]);
        assert_eq!(backend.searches.load(Ordering::SeqCst), 1);

        repository.find("stolica", "clarin-pl-poquad-500", 5).await.unwrap();
        assert_eq!(backend.searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_hits_is_an_empty_result() {
        let backend = Arc::new(FakeIndex::default());
        let repository = LexicalRepository::new(backend.clone(), Arc::new(Cache::in_memory()));

        let result = repository.find("nic", "clarin-pl-poquad-500", 10).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.query, "nic");
        repository.find("nic", "clarin-pl-poquad-500", 10).await.unwrap();
        assert_eq!(backend.searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn counts_are_cached_regardless_of_id_order() {
        let backend = Arc::new(FakeIndex::default());
        let repository = LexicalRepository::new(backend.clone(), Arc::new(Cache::in_memory()));
        repository.insert_one(passage("1", "a")).await.unwrap();
        repository.insert_one(passage("2", "b")).await.unwrap();

        let ids = vec!["2".to_string(), "1".to_string()];
        let reversed = vec!["1".to_string(), "2".to_string()];
        assert_eq!(
            repository.count_relevant_documents(&ids, "clarin-pl-poquad-500").await.unwrap(),
            2
        );
        assert_eq!(
            repository
                .count_relevant_documents(&reversed, "clarin-pl-poquad-500")
                .await
                .unwrap(),
            2
        );
        assert_eq!(backend.counts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn works_over_tantivy() {
        let backend = Arc::new(TantivyBackend::in_memory(&LexicalSettings::default()).unwrap());
        let repository = LexicalRepository::new(backend, Arc::new(Cache::in_memory()));
        repository
            .insert_many(vec![
                passage("1", "Wisła jest najdłuższą rzeką w Polsce"),
                passage("2", "Odra płynie przez Wrocław"),
                passage("3", "Wisła przepływa przez Kraków i Warszawę"),
            ])
            .await
            .unwrap();

        let result = repository.find("Wisła", "clarin-pl-poquad-500", 10).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.top().unwrap().score, 1.0);
        assert!(result.scores().iter().all(|s| (0.0..=1.0).contains(s)));

        repository.delete("clarin-pl-poquad-500").await.unwrap();
        assert!(repository
            .find("Odra", "clarin-pl-poquad-500", 10)
            .await
            .unwrap()
            .is_empty());
    }
}
