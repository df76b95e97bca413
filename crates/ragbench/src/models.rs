//! Catalogue of known embedding and cross-encoder models plus naming helpers
//! for collections and dataset partitions.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Datasets the benchmark is normally run against.
pub const DATASET_NAMES: &[&str] = &["ipipan/polqa", "clarin-pl/poquad"];

/// Lexical index variants (analyzer configurations).
pub const INDEX_NAMES: &[&str] = &[
    "basic_index",
    "polish_index",
    "polish_whitespace_index",
    "polish_stopwords_index",
    "morfologik_index",
    "morfologik_whitespace_index",
    "morfologik_stopwords_index",
];

/// `(chunk size, overlap)` splits used when ingesting passages.
pub const CHUNK_SIZES: &[(usize, usize)] = &[(500, 100), (1000, 200), (2000, 500), (100_000, 0)];

pub const DEFAULT_RERANKER_MODEL: &str = "sdadas/polish-reranker-large-ranknet";

/// An embedding model together with the prefixes it was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingModel {
    pub name: &'static str,
    pub dimension: u64,
    pub query_prefix: &'static str,
    pub passage_prefix: &'static str,
}

impl EmbeddingModel {
    pub fn prefixed_query(&self, query: &str) -> String {
        format!("{}{}", self.query_prefix, query)
    }

    pub fn prefixed_passage(&self, text: &str) -> String {
        format!("{}{}", self.passage_prefix, text)
    }
}

pub const EMBEDDING_MODELS: &[EmbeddingModel] = &[
    EmbeddingModel {
        name: "sdadas/mmlw-retrieval-roberta-large",
        dimension: 1024,
        query_prefix: "zapytanie: ",
        passage_prefix: "",
    },
    EmbeddingModel {
        name: "ipipan/silver-retriever-base-v1",
        dimension: 768,
        query_prefix: "Pytanie: ",
        passage_prefix: "",
    },
    EmbeddingModel {
        name: "intfloat/multilingual-e5-large",
        dimension: 1024,
        query_prefix: "query: ",
        passage_prefix: "passage: ",
    },
    EmbeddingModel {
        name: "sdadas/mmlw-roberta-large",
        dimension: 1024,
        query_prefix: "zapytanie: ",
        passage_prefix: "",
    },
    EmbeddingModel {
        name: "BAAI/bge-m3",
        dimension: 1024,
        query_prefix: "",
        passage_prefix: "",
    },
    EmbeddingModel {
        name: "text-embedding-3-large",
        dimension: 3072,
        query_prefix: "",
        passage_prefix: "",
    },
];

/// Look up an embedding model by its hub name.
pub fn embedding_model(name: &str) -> Result<EmbeddingModel, ConfigError> {
    EMBEDDING_MODELS
        .iter()
        .find(|model| model.name == name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownModel {
            name: name.to_string(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossEncoderModel {
    pub name: &'static str,
    /// Maximum sequence length in tokens
    pub max_length: usize,
}

pub const CROSS_ENCODER_MODELS: &[CrossEncoderModel] = &[CrossEncoderModel {
    name: DEFAULT_RERANKER_MODEL,
    max_length: 512,
}];

pub fn cross_encoder_model(name: &str) -> Result<CrossEncoderModel, ConfigError> {
    CROSS_ENCODER_MODELS
        .iter()
        .find(|model| model.name == name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownModel {
            name: name.to_string(),
        })
}

/// Vector distance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Distance {
    Cosine,
    Euclid,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Euclid => "Euclid",
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distance {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Distance::Cosine),
            "euclid" | "euclidean" => Ok(Distance::Euclid),
            _ => Err(ConfigError::UnknownDistance {
                value: value.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Distance {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Distance> for String {
    fn from(distance: Distance) -> Self {
        distance.as_str().to_string()
    }
}

fn replace_slash_with_dash(text: &str) -> String {
    text.replace('/', "-")
}

/// Partition key for one dataset split, e.g. `ipipan-polqa-500`.
pub fn dataset_key(dataset_name: &str, split: impl fmt::Display) -> String {
    replace_slash_with_dash(&format!("{}-{}", dataset_name, split))
}

/// Collection holding one model's embeddings under one distance metric.
pub fn collection_name(model_name: &str, distance: Distance) -> String {
    replace_slash_with_dash(&format!("{}-{}", model_name, distance))
}

/// Every dataset key produced by [`DATASET_NAMES`] x [`CHUNK_SIZES`].
pub fn all_dataset_keys() -> Vec<String> {
    DATASET_NAMES
        .iter()
        .flat_map(|name| {
            CHUNK_SIZES
                .iter()
                .map(move |(chunk_size, _)| dataset_key(name, chunk_size))
        })
        .collect()
}
