//! Error types for retrieval, reranking and evaluation

use std::fmt::Display;

use ragbench_cache::CacheError;
use thiserror::Error;

use crate::lexical::LexicalError;

pub type RagResult<T> = Result<T, RagError>;

/// Invalid configuration, reported before any external call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown model: {name}")]
    UnknownModel { name: String },

    #[error("Unknown distance '{value}', expected 'cosine' or 'euclid'")]
    UnknownDistance { value: String },

    #[error("Fusion weight alpha must lie in [0, 1], got {alpha}")]
    InvalidAlpha { alpha: f32 },

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: &'static str },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to render settings: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Lexical index error: {0}")]
    Lexical(#[from] LexicalError),

    #[error("Backend error during {stage}: {message}")]
    Backend { stage: &'static str, message: String },

    #[error("Unexpected response during {stage}: {message}")]
    InvalidResponse { stage: &'static str, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn backend(stage: &'static str, err: impl Display) -> Self {
        Self::Backend {
            stage,
            message: err.to_string(),
        }
    }

    pub fn invalid_response(stage: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            stage,
            message: message.into(),
        }
    }
}
