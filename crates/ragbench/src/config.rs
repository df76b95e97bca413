//! Layered settings: built-in defaults, an optional TOML file, then
//! `RAGBENCH_*` environment variables (`__` separates sections, e.g.
//! `RAGBENCH_RETRIEVAL__ALPHA=0.3`).

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use config::{Config, Environment, File, FileFormat};
use ragbench_cache::{Cache, DiskStorage};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, models::Distance};

pub const ENV_PREFIX: &str = "RAGBENCH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub cache: CacheSettings,
    pub lexical: LexicalSettings,
    pub qdrant: QdrantSettings,
    pub retrieval: RetrievalSettings,
    pub evaluation: EvaluationSettings,
    pub import: ImportSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Directory for the disk backend
    pub path: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: PathBuf::from(".ragbench/cache"),
        }
    }
}

impl CacheSettings {
    /// Open the configured cache. The disk backend creates its directory on
    /// first write.
    pub fn build_cache(&self) -> Cache {
        match self.backend {
            CacheBackend::Memory => Cache::in_memory(),
            CacheBackend::Disk => Cache::new(Arc::new(DiskStorage::new(&self.path))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalSettings {
    pub index_dir: PathBuf,
    pub index_name: String,
    pub writer_heap_bytes: usize,
    pub max_query_terms: usize,
}

impl Default for LexicalSettings {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from(".ragbench/lexical"),
            index_name: "basic_index".to_string(),
            writer_heap_bytes: 50_000_000,
            max_query_terms: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantSettings {
    pub uri: String,
    pub distance: Distance,
    pub ef_search: u64,
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            uri: "http://localhost:6334".to_string(),
            distance: Distance::Cosine,
            ef_search: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_size: usize,
    /// Lexical weight for hybrid fusion
    pub alpha: f32,
    /// Candidate multiplier when a reranker is attached
    pub rerank_overfetch: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_size: 10,
            alpha: 0.5,
            rerank_overfetch: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub retrieval_weight: f32,
    pub answer_quality_weight: f32,
    pub base_weight: f32,
    pub correctness_weight: f32,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub faithfulness_steepness: f32,
    pub hallucination_faithfulness_weight: f32,
    pub hallucination_answer_relevance_weight: f32,
    pub hallucination_context_relevance_weight: f32,
    /// Embedding prefix for questions compared in answer relevance
    pub question_prefix: String,
    pub back_question_count: usize,
    pub back_question_max_tokens: usize,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            retrieval_weight: 0.3,
            answer_quality_weight: 0.7,
            base_weight: 0.6,
            correctness_weight: 0.4,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            faithfulness_steepness: 5.0,
            hallucination_faithfulness_weight: 0.6,
            hallucination_answer_relevance_weight: 0.25,
            hallucination_context_relevance_weight: 0.15,
            question_prefix: "zapytanie: ".to_string(),
            back_question_count: 3,
            back_question_max_tokens: 300,
        }
    }
}

impl EvaluationSettings {
    fn weights(&self) -> [(&'static str, f32); 10] {
        [
            ("evaluation.retrieval_weight", self.retrieval_weight),
            ("evaluation.answer_quality_weight", self.answer_quality_weight),
            ("evaluation.base_weight", self.base_weight),
            ("evaluation.correctness_weight", self.correctness_weight),
            ("evaluation.semantic_weight", self.semantic_weight),
            ("evaluation.keyword_weight", self.keyword_weight),
            ("evaluation.faithfulness_steepness", self.faithfulness_steepness),
            (
                "evaluation.hallucination_faithfulness_weight",
                self.hallucination_faithfulness_weight,
            ),
            (
                "evaluation.hallucination_answer_relevance_weight",
                self.hallucination_answer_relevance_weight,
            ),
            (
                "evaluation.hallucination_context_relevance_weight",
                self.hallucination_context_relevance_weight,
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub batch_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

impl RagSettings {
    /// Defaults overlaid with environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder())
    }

    /// Defaults, then `path` (may be absent), then environment variables.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref().to_path_buf()).required(false));
        Self::from_builder(builder)
    }

    /// Parse a TOML document on top of the defaults, ignoring the environment.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings: RagSettings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let settings: RagSettings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let alpha = self.retrieval.alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::InvalidAlpha { alpha });
        }
        if self.retrieval.default_size == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.default_size",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.retrieval.rerank_overfetch == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.rerank_overfetch",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.import.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "import.batch_size",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.lexical.writer_heap_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "lexical.writer_heap_bytes",
                message: "must be greater than 0".to_string(),
            });
        }
        for (field, weight) in self.evaluation.weights() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("must be a finite, non-negative number, got {weight}"),
                });
            }
        }
        Ok(())
    }
}
