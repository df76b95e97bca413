//! # RagBench
//!
//! Passage retrieval and RAG evaluation over a partitioned text corpus.
//!
//! - **Repositories**: one find/insert/count contract over an embedded
//!   tantivy index ([`LexicalRepository`]) and a Qdrant collection
//!   ([`VectorRepository`]); hits are min-max normalized and cached
//! - **Retrievers**: single-repository with optional over-fetch and rerank
//!   ([`RepositoryRetriever`]), and weighted lexical/vector fusion
//!   ([`HybridRetriever`])
//! - **Reranking**: cross-encoder re-scoring with permutation-invariant
//!   cache keys ([`CrossEncoderReranker`])
//! - **Evaluation**: NDCG, MRR, Recall@k, Accuracy@1, EM/F1 and a composite
//!   RAGAS-style score
//!
//! Every external call goes through an async trait so backends and models
//! can be swapped for in-memory fakes.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod generation;
pub mod http;
pub mod importer;
pub mod lexical;
#[cfg(feature = "local-models")]
pub mod local;
pub mod models;
pub mod passage;
pub mod repository;
pub mod rerank;
pub mod retrieval;
pub mod telemetry;
pub mod vector;

pub use config::RagSettings;
pub use error::{ConfigError, RagError, RagResult};
pub use evaluation::{
    EvaluationInput, EvaluationReport, EvaluationRun, QaEvaluator, RagasEvaluator,
    RetrievalEvaluator,
};
pub use importer::{ImportStats, PassageImporter};
pub use models::{collection_name, dataset_key, embedding_model, Distance, EmbeddingModel};
pub use passage::{normalize_scores, Passage, RelevanceKey, RetrievalResult, ScoredPassage};
pub use ragbench_cache::{Cache, CacheKey, Namespace};
pub use repository::{LexicalRepository, Repository, RepositoryKind, VectorRepository};
pub use rerank::{CrossEncoder, CrossEncoderReranker, Reranker};
pub use retrieval::{HybridRetriever, RepositoryRetriever, Retriever};
pub use vector::Vectorizer;
