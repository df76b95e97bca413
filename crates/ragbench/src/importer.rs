//! Sequential batch import of passages into a repository.
//!
//! Batches are written one after another and are not transactional: when a
//! batch fails, earlier batches stay written and the error is returned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::ImportSettings,
    error::{ConfigError, RagError, RagResult},
    passage::Passage,
    repository::{Repository, VectorRepository},
};

pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub batches: usize,
    pub passages: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PassageImporter {
    batch_size: usize,
}

impl Default for PassageImporter {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PassageImporter {
    pub fn new(batch_size: usize) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "import.batch_size",
                message: "must be at least 1".into(),
            });
        }
        Ok(Self { batch_size })
    }

    pub fn from_settings(settings: &ImportSettings) -> Result<Self, ConfigError> {
        Self::new(settings.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert passages as-is; the repository embeds them if it needs to.
    pub async fn import_passages(
        &self,
        repository: &dyn Repository,
        passages: Vec<Passage>,
    ) -> RagResult<ImportStats> {
        let mut stats = ImportStats::default();
        for batch in passages.chunks(self.batch_size) {
            repository.insert_many(batch.to_vec()).await?;
            stats.record(batch.len());
        }
        Ok(stats)
    }

    /// Embed each passage with the repository's vectorizer (passage prefix
    /// applied) and store the vectors alongside.
    pub async fn import_embedded(
        &self,
        repository: &VectorRepository,
        passages: Vec<Passage>,
    ) -> RagResult<ImportStats> {
        let mut stats = ImportStats::default();
        for batch in passages.chunks(self.batch_size) {
            let mut points = Vec::with_capacity(batch.len());
            for passage in batch {
                let text = repository.model().prefixed_passage(&passage.context);
                let vector = repository.vectorizer().get_vector(&text).await?;
                points.push((passage.clone(), vector));
            }
            repository.insert_many_with_vectors(points).await?;
            stats.record(batch.len());
        }
        Ok(stats)
    }

    /// Store embeddings computed elsewhere, looked up by [`embedding_id`].
    /// A passage without an embedding fails its batch.
    pub async fn import_precomputed(
        &self,
        repository: &VectorRepository,
        passages: Vec<Passage>,
        embeddings: &HashMap<String, Vec<f32>>,
    ) -> RagResult<ImportStats> {
        let mut stats = ImportStats::default();
        for batch in passages.chunks(self.batch_size) {
            let points = batch
                .iter()
                .map(|passage| {
                    let id = embedding_id(passage);
                    embeddings
                        .get(&id)
                        .map(|vector| (passage.clone(), vector.clone()))
                        .ok_or_else(|| {
                            RagError::invalid_response("import", format!("no embedding for {id}"))
                        })
                })
                .collect::<RagResult<Vec<_>>>()?;
            repository.insert_many_with_vectors(points).await?;
            stats.record(batch.len());
        }
        Ok(stats)
    }
}

impl ImportStats {
    fn record(&mut self, batch_len: usize) {
        self.batches += 1;
        self.passages += batch_len;
        info!(batch = self.batches, "Processed {} passages", self.passages);
    }
}

/// `"<id>-<start_index>"`, the identifier under which externally computed
/// embeddings are matched to passages.
pub fn embedding_id(passage: &Passage) -> String {
    format!("{}-{}", passage.id, passage.start_index)
}
