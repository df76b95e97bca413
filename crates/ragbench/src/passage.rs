//! Passage and retrieval result value types

use std::{
    hash::{Hash, Hasher},
    slice,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Free-form passage metadata, e.g. `{"passage_id": "..."}` for chunked sources.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata field naming the source passage a chunk was cut from.
pub const SOURCE_PASSAGE_ID_FIELD: &str = "passage_id";

/// A span of source text, the unit of retrieval.
///
/// Identity is `(id, dataset_key)`; the remaining fields do not take part in
/// equality or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub title: String,
    pub context: String,
    pub start_index: i64,
    pub dataset: String,
    pub dataset_key: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Passage {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        context: impl Into<String>,
        start_index: i64,
        dataset: impl Into<String>,
        dataset_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            context: context.into(),
            start_index,
            dataset: dataset.into(),
            dataset_key: dataset_key.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Stable content address over title and text, independent of `id`.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [self.title.as_bytes(), self.context.as_bytes()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        hex::encode(hasher.finalize())
    }

    /// `metadata.passage_id` rendered as a string, if present.
    pub fn source_passage_id(&self) -> Option<String> {
        match self.metadata.get(SOURCE_PASSAGE_ID_FIELD)? {
            serde_json::Value::String(text) => Some(text.clone()),
            serde_json::Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

impl PartialEq for Passage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.dataset_key == other.dataset_key
    }
}

impl Eq for Passage {}

impl Hash for Passage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.dataset_key.hash(state);
    }
}

/// Which passage attribute identifies a ground-truth answer passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceKey {
    /// Compare [`Passage::id`]
    #[default]
    PassageId,
    /// Compare `metadata.passage_id`; used when passages are chunks of a source passage
    SourcePassageId,
}

impl RelevanceKey {
    /// The convention used by each benchmark dataset: PoQuAD passages are
    /// matched by id, PolQA chunks by their source passage.
    pub fn for_dataset_key(dataset_key: &str) -> Self {
        if dataset_key.contains("poquad") {
            RelevanceKey::PassageId
        } else {
            RelevanceKey::SourcePassageId
        }
    }

    pub fn identity(&self, passage: &Passage) -> Option<String> {
        match self {
            RelevanceKey::PassageId => Some(passage.id.clone()),
            RelevanceKey::SourcePassageId => passage.source_passage_id(),
        }
    }

    pub fn matches(&self, passage: &Passage, correct_ids: &[String]) -> bool {
        self.identity(passage)
            .is_some_and(|id| correct_ids.iter().any(|correct| *correct == id))
    }

    /// Stored field path used for counting in search backends.
    pub fn field_path(&self) -> &'static str {
        match self {
            RelevanceKey::PassageId => "id",
            RelevanceKey::SourcePassageId => "metadata.passage_id",
        }
    }
}

/// A passage paired with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

impl ScoredPassage {
    pub fn new(passage: Passage, score: f32) -> Self {
        Self { passage, score }
    }
}

/// Ranked passages for one query, best first.
///
/// After normalization scores lie in `[0, 1]`; scores of two results are only
/// comparable when both were normalized by the same rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub passages: Vec<ScoredPassage>,
}

impl RetrievalResult {
    pub fn new(query: impl Into<String>, passages: Vec<ScoredPassage>) -> Self {
        Self {
            query: query.into(),
            passages,
        }
    }

    pub fn empty(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, ScoredPassage> {
        self.passages.iter()
    }

    pub fn top(&self) -> Option<&ScoredPassage> {
        self.passages.first()
    }

    pub fn passage_ids(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.passage.id.clone()).collect()
    }

    pub fn scores(&self) -> Vec<f32> {
        self.passages.iter().map(|p| p.score).collect()
    }

    /// Passage texts in rank order.
    pub fn contexts(&self) -> impl Iterator<Item = &str> {
        self.passages.iter().map(|p| p.passage.context.as_str())
    }

    /// Passage texts joined with single spaces, newlines flattened.
    pub fn joined_context(&self) -> String {
        self.contexts()
            .collect::<Vec<_>>()
            .join(" ")
            .replace('\n', " ")
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredPassage;
    type IntoIter = slice::Iter<'a, ScoredPassage>;

    fn into_iter(self) -> Self::IntoIter {
        self.passages.iter()
    }
}

/// Min-max scale `scores` into `[0, 1]`. A degenerate range (all scores
/// equal, including a single score) maps every entry to `1.0`.
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let range = max - min;

    if range == 0.0 || !range.is_finite() {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| ((score - min) / range).clamp(0.0, 1.0))
        .collect()
}

/// Sort descending by score, stable for ties.
pub(crate) fn sort_descending(passages: &mut [ScoredPassage]) {
    passages.sort_by(|a, b| b.score.total_cmp(&a.score));
}
