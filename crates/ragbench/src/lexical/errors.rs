use thiserror::Error;

pub type LexicalResult<T> = Result<T, LexicalError>;

#[derive(Debug, Error)]
pub enum LexicalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("Cannot open index directory: {0}")]
    OpenDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("Metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Stored document missing field: {0}")]
    MissingField(&'static str),
}
