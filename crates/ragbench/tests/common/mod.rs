//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use ragbench::{
    config::LexicalSettings,
    lexical::{LexicalBackend, TantivyBackend},
    rerank::CrossEncoder,
    vector::{cosine_similarity, VectorBackend, Vectorizer},
    EmbeddingModel, Passage, RagResult, RelevanceKey, ScoredPassage,
};

pub const DATASET_KEY: &str = "clarin-pl-poquad-test";

pub const LETTERS_MODEL: EmbeddingModel = EmbeddingModel {
    name: "test/letters",
    dimension: 26,
    query_prefix: "query: ",
    passage_prefix: "passage: ",
};

pub fn corpus() -> Vec<Passage> {
    vec![
        Passage::new(
            "p1",
            "Warszawa",
            "Warszawa jest stolicą Polski i największym miastem kraju.",
            0,
            "clarin-pl/poquad",
            DATASET_KEY,
        ),
        Passage::new(
            "p2",
            "Kraków",
            "Kraków był stolicą Polski do końca XVI wieku.",
            0,
            "clarin-pl/poquad",
            DATASET_KEY,
        ),
        Passage::new(
            "p3",
            "Wisła",
            "Wisła jest najdłuższą rzeką w Polsce.",
            0,
            "clarin-pl/poquad",
            DATASET_KEY,
        ),
        Passage::new(
            "p4",
            "Gdańsk",
            "Gdańsk leży nad Morzem Bałtyckim.",
            0,
            "clarin-pl/poquad",
            DATASET_KEY,
        ),
        Passage::new(
            "p5",
            "Warszawa",
            "Warszawa jest stolicą Polski.",
            0,
            "clarin-pl/poquad",
            "clarin-pl-poquad-train",
        ),
    ]
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Tantivy index in RAM that counts searches.
pub struct CountingIndex {
    inner: TantivyBackend,
    pub searches: AtomicUsize,
}

impl CountingIndex {
    pub fn new() -> Arc<Self> {
        let inner = TantivyBackend::in_memory(&LexicalSettings::default())
            .expect("in-memory index");
        Arc::new(Self {
            inner,
            searches: AtomicUsize::new(0),
        })
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LexicalBackend for CountingIndex {
    fn index_name(&self) -> &str {
        self.inner.index_name()
    }

    async fn search(
        &self,
        query: &str,
        dataset_key: &str,
        limit: usize,
    ) -> RagResult<Vec<ScoredPassage>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query, dataset_key, limit).await
    }

    async fn insert(&self, passages: &[Passage]) -> RagResult<()> {
        self.inner.insert(passages).await
    }

    async fn delete_dataset(&self, dataset_key: &str) -> RagResult<()> {
        self.inner.delete_dataset(dataset_key).await
    }

    async fn count(&self, key: RelevanceKey, ids: &[String], dataset_key: &str) -> RagResult<u64> {
        self.inner.count(key, ids, dataset_key).await
    }
}

/// Brute-force cosine search over stored points.
#[derive(Default)]
pub struct MemoryCollection {
    pub points: Mutex<Vec<(Passage, Vec<f32>)>>,
    pub dimension: Mutex<Option<u64>>,
    pub searches: AtomicUsize,
}

#[async_trait]
impl VectorBackend for MemoryCollection {
    fn collection_name(&self) -> &str {
        "test-letters-Cosine"
    }

    async fn ensure_collection(&self, dimension: u64) -> RagResult<()> {
        *self.dimension.lock() = Some(dimension);
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        dataset_key: &str,
        limit: usize,
    ) -> RagResult<Vec<ScoredPassage>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let mut hits: Vec<ScoredPassage> = self
            .points
            .lock()
            .iter()
            .filter(|(passage, _)| passage.dataset_key == dataset_key)
            .map(|(passage, stored)| {
                ScoredPassage::new(passage.clone(), cosine_similarity(&vector, stored))
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(&self, points: Vec<(Passage, Vec<f32>)>) -> RagResult<()> {
        self.points.lock().extend(points);
        Ok(())
    }

    async fn delete_dataset(&self, dataset_key: &str) -> RagResult<()> {
        self.points
            .lock()
            .retain(|(passage, _)| passage.dataset_key != dataset_key);
        Ok(())
    }

    async fn count(&self, key: RelevanceKey, ids: &[String], dataset_key: &str) -> RagResult<u64> {
        Ok(self
            .points
            .lock()
            .iter()
            .filter(|(passage, _)| passage.dataset_key == dataset_key && key.matches(passage, ids))
            .count() as u64)
    }
}

/// Letter-frequency embeddings over `a..z`.
pub struct LetterVectorizer {
    pub calls: AtomicUsize,
}

impl LetterVectorizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; 26];
        for byte in text.to_ascii_lowercase().bytes() {
            if byte.is_ascii_lowercase() {
                vector[usize::from(byte - b'a')] += 1.0;
            }
        }
        vector
    }
}

#[async_trait]
impl Vectorizer for LetterVectorizer {
    fn model_name(&self) -> &str {
        LETTERS_MODEL.name
    }

    async fn get_vector(&self, text: &str) -> RagResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::embed(text))
    }
}

/// Scores a pair by the number of distinct query words found in the document.
pub struct OverlapEncoder {
    pub calls: AtomicUsize,
}

impl OverlapEncoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CrossEncoder for OverlapEncoder {
    fn model_name(&self) -> &str {
        "test/overlap"
    }

    async fn predict(&self, pairs: &[(String, String)]) -> RagResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(pairs
            .iter()
            .map(|(query, document)| {
                let document = document.to_lowercase();
                let words: HashSet<&str> = document
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .collect();
                query
                    .to_lowercase()
                    .split_whitespace()
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .filter(|w| words.contains(w))
                    .count() as f32
            })
            .collect())
    }
}
