use tantivy::schema::{Field, Schema, SchemaBuilder, INDEXED, STORED, STRING, TEXT};

use crate::passage::RelevanceKey;

/// Tantivy schema for passages. `title` and `context` are tokenized for
/// BM25; the identifier fields are raw terms used for filtering.
#[derive(Clone)]
pub struct PassageSchema {
    schema: Schema,
    pub point_id_field: Field,
    pub id_field: Field,
    pub title_field: Field,
    pub context_field: Field,
    pub start_index_field: Field,
    pub dataset_field: Field,
    pub dataset_key_field: Field,
    pub source_passage_id_field: Field,
    pub metadata_field: Field,
}

impl PassageSchema {
    pub fn build() -> Self {
        let mut builder = SchemaBuilder::default();
        let point_id_field = builder.add_text_field("point_id", STRING | STORED);
        let id_field = builder.add_text_field("id", STRING | STORED);
        let title_field = builder.add_text_field("title", TEXT | STORED);
        let context_field = builder.add_text_field("context", TEXT | STORED);
        let start_index_field = builder.add_i64_field("start_index", INDEXED | STORED);
        let dataset_field = builder.add_text_field("dataset", STRING | STORED);
        let dataset_key_field = builder.add_text_field("dataset_key", STRING | STORED);
        let source_passage_id_field = builder.add_text_field("source_passage_id", STRING);
        let metadata_field = builder.add_text_field("metadata", STORED);

        Self {
            schema: builder.build(),
            point_id_field,
            id_field,
            title_field,
            context_field,
            start_index_field,
            dataset_field,
            dataset_key_field,
            source_passage_id_field,
            metadata_field,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn text_fields(&self) -> Vec<Field> {
        vec![self.title_field, self.context_field]
    }

    pub fn relevance_field(&self, key: RelevanceKey) -> Field {
        match key {
            RelevanceKey::PassageId => self.id_field,
            RelevanceKey::SourcePassageId => self.source_passage_id_field,
        }
    }
}
