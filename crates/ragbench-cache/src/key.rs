//! Structured, deterministic cache keys
//!
//! Every memoized operation derives its key from an ordered list of named
//! fields. Each field is written as `len(name) name len(value) value` before
//! hashing, so adjacent values can never run together and produce the same
//! digest (`"ab" + "c"` vs `"a" + "bc"`).

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Key namespaces, rendered as the prefix before the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Embedding vectors
    Vectorizer,
    /// Lexical search results
    Query,
    /// Vector search results
    Prompt,
    /// Cross-encoder rerank results
    Reranker,
    /// Relevant document counts
    Count,
    /// Generated answers
    Generator,
    /// Faithfulness scores
    Faithfulness,
    /// Answer relevance scores
    AnswerRelevance,
    /// Query-to-context relevance scores
    ContextRelevance,
}

impl Namespace {
    pub const ALL: [Namespace; 9] = [
        Namespace::Vectorizer,
        Namespace::Query,
        Namespace::Prompt,
        Namespace::Reranker,
        Namespace::Count,
        Namespace::Generator,
        Namespace::Faithfulness,
        Namespace::AnswerRelevance,
        Namespace::ContextRelevance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Vectorizer => "vectorizer",
            Namespace::Query => "query",
            Namespace::Prompt => "prompt",
            Namespace::Reranker => "reranker",
            Namespace::Count => "count",
            Namespace::Generator => "generator",
            Namespace::Faithfulness => "faithfulness",
            Namespace::AnswerRelevance => "answer_relevance",
            Namespace::ContextRelevance => "context_relevance",
        }
    }

    /// Prefix shared by every key in this namespace, including the separator.
    pub fn prefix(&self) -> String {
        format!("{}:", self.as_str())
    }

    /// Namespace of an already built key, if it has a known prefix.
    pub fn of_key(key: &str) -> Option<Namespace> {
        let (prefix, _) = key.split_once(':')?;
        Self::ALL.into_iter().find(|ns| ns.as_str() == prefix)
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder that folds named fields into a namespaced SHA-256 key.
///
/// ```
/// use ragbench_cache::{CacheKey, Namespace};
///
/// let key = CacheKey::new(Namespace::Query)
///     .field("index", "morfologik_index")
///     .field("dataset_key", "clarin-pl-poquad-500")
///     .field("query", "Jaka jest stolica Polski?")
///     .field("size", 10)
///     .build();
/// assert!(key.starts_with("query:"));
/// assert_eq!(key.len(), "query:".len() + 64);
/// ```
#[derive(Clone)]
pub struct CacheKey {
    namespace: Namespace,
    hasher: Sha256,
}

impl CacheKey {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            hasher: Sha256::new(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Append a scalar field.
    pub fn field(mut self, name: &str, value: impl Display) -> Self {
        self.write(name.as_bytes());
        self.write(value.to_string().as_bytes());
        self
    }

    /// Append a list field whose element order is significant.
    pub fn list<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<S> = values.into_iter().collect();
        self.write(name.as_bytes());
        self.hasher.update((values.len() as u64).to_le_bytes());
        for value in &values {
            self.write(value.as_ref().as_bytes());
        }
        self
    }

    /// Append a list field that is sorted first, so any permutation of the
    /// same elements yields the same key.
    pub fn sorted_list<I, S>(self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values: Vec<String> = values
            .into_iter()
            .map(|value| value.as_ref().to_string())
            .collect();
        values.sort();
        self.list(name, values)
    }

    /// Finish hashing and render `"<namespace>:<hex digest>"`.
    pub fn build(self) -> String {
        let digest = self.hasher.finalize();
        format!("{}:{}", self.namespace, hex::encode(digest))
    }

    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheKey")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
