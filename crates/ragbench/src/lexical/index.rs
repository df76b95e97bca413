use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tantivy::{
    collector::{Count, TopDocs},
    directory::MmapDirectory,
    doc,
    query::{BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::{IndexRecordOption, TantivyDocument, Value},
    Index, IndexReader, IndexWriter, ReloadPolicy, Term,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::LexicalSettings,
    error::RagResult,
    lexical::{
        errors::{LexicalError, LexicalResult},
        schema::PassageSchema,
        LexicalBackend,
    },
    passage::{Metadata, Passage, RelevanceKey, ScoredPassage},
};

/// BM25 passage index backed by tantivy.
///
/// Every passage is stored under a fresh point id, so inserting the same
/// passage twice yields two documents.
pub struct TantivyBackend {
    name: String,
    schema: PassageSchema,
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    max_query_terms: usize,
    directory: Option<PathBuf>,
}

impl TantivyBackend {
    /// Open `<index_dir>/<index_name>`, creating it when absent.
    pub fn open(settings: &LexicalSettings) -> LexicalResult<Self> {
        let path = settings.index_dir.join(&settings.index_name);
        fs::create_dir_all(&path)?;
        let schema = PassageSchema::build();
        let directory = MmapDirectory::open(&path)?;
        let index = Index::open_or_create(directory, schema.schema().clone())?;
        let mut backend = Self::from_index(&settings.index_name, schema, index, settings)?;
        info!(
            index = %settings.index_name,
            path = %path.display(),
            documents = backend.num_docs(),
            "Opened lexical index"
        );
        backend.directory = Some(path);
        Ok(backend)
    }

    /// RAM-only index, lost on drop.
    pub fn in_memory(settings: &LexicalSettings) -> LexicalResult<Self> {
        let schema = PassageSchema::build();
        let index = Index::create_in_ram(schema.schema().clone());
        Self::from_index(&settings.index_name, schema, index, settings)
    }

    fn from_index(
        name: &str,
        schema: PassageSchema,
        index: Index,
        settings: &LexicalSettings,
    ) -> LexicalResult<Self> {
        let writer = index.writer_with_num_threads(1, settings.writer_heap_bytes)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            name: name.to_string(),
            schema,
            index,
            reader,
            writer: Mutex::new(writer),
            max_query_terms: settings.max_query_terms,
            directory: None,
        })
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Top `limit` passages of `dataset_key` by raw BM25 score.
    pub fn search_passages(
        &self,
        query: &str,
        dataset_key: &str,
        limit: usize,
    ) -> LexicalResult<Vec<ScoredPassage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let searcher = self.reader.searcher();
        let query = self.build_query(query, dataset_key);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let document: TantivyDocument = searcher.doc(address)?;
            hits.push(ScoredPassage::new(self.to_passage(&document)?, score));
        }

        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(50) {
            warn!(
                index = %self.name,
                elapsed_ms = elapsed.as_millis(),
                "Lexical search exceeded latency target"
            );
        } else {
            debug!(
                index = %self.name,
                elapsed_us = elapsed.as_micros(),
                hits = hits.len(),
                "Lexical search completed"
            );
        }
        Ok(hits)
    }

    pub fn add_passages(&self, passages: &[Passage]) -> LexicalResult<()> {
        if passages.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        for passage in passages {
            writer.add_document(self.to_document(passage)?)?;
        }
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    pub fn delete_dataset_key(&self, dataset_key: &str) -> LexicalResult<()> {
        let mut writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.schema.dataset_key_field, dataset_key));
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        info!(index = %self.name, dataset_key, "Deleted lexical dataset");
        Ok(())
    }

    /// Documents of `dataset_key` whose relevance field equals any of `ids`.
    pub fn count_matching(
        &self,
        key: RelevanceKey,
        ids: &[String],
        dataset_key: &str,
    ) -> LexicalResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let field = self.schema.relevance_field(key);
        let id_clauses: Vec<(Occur, Box<dyn Query>)> = ids
            .iter()
            .map(|id| {
                let term = TermQuery::new(
                    Term::from_field_text(field, id),
                    IndexRecordOption::Basic,
                );
                (Occur::Should, Box::new(term) as Box<dyn Query>)
            })
            .collect();
        let query = BooleanQuery::new(vec![
            (Occur::Must, self.dataset_filter(dataset_key)),
            (Occur::Must, Box::new(BooleanQuery::new(id_clauses))),
        ]);
        let count = self.reader.searcher().search(&query, &Count)?;
        Ok(count as u64)
    }

    fn build_query(&self, text: &str, dataset_key: &str) -> BooleanQuery {
        let parser = QueryParser::for_index(&self.index, self.schema.text_fields());
        let truncated = self.truncate_terms(text);
        let (text_query, errors) = parser.parse_query_lenient(&truncated);
        if !errors.is_empty() {
            debug!(errors = errors.len(), "Lenient query parse dropped clauses");
        }
        BooleanQuery::new(vec![
            (Occur::Must, text_query),
            (Occur::Must, self.dataset_filter(dataset_key)),
        ])
    }

    fn dataset_filter(&self, dataset_key: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(self.schema.dataset_key_field, dataset_key),
            IndexRecordOption::Basic,
        ))
    }

    fn truncate_terms(&self, query: &str) -> String {
        query
            .split_whitespace()
            .take(self.max_query_terms)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_document(&self, passage: &Passage) -> LexicalResult<TantivyDocument> {
        let schema = &self.schema;
        let mut document = doc!(
            schema.point_id_field => Uuid::new_v4().to_string(),
            schema.id_field => passage.id.as_str(),
            schema.title_field => passage.title.as_str(),
            schema.context_field => passage.context.as_str(),
            schema.start_index_field => passage.start_index,
            schema.dataset_field => passage.dataset.as_str(),
            schema.dataset_key_field => passage.dataset_key.as_str(),
            schema.metadata_field => serde_json::to_string(&passage.metadata)?,
        );
        if let Some(source) = passage.source_passage_id() {
            document.add_text(schema.source_passage_id_field, source);
        }
        Ok(document)
    }

    fn to_passage(&self, document: &TantivyDocument) -> LexicalResult<Passage> {
        let text = |field, name: &'static str| {
            document
                .get_first(field)
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .ok_or(LexicalError::MissingField(name))
        };
        let schema = &self.schema;
        let start_index = document
            .get_first(schema.start_index_field)
            .and_then(|value| value.as_i64())
            .unwrap_or_default();
        let metadata: Metadata = match document
            .get_first(schema.metadata_field)
            .and_then(|value| value.as_str())
        {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => Metadata::new(),
        };

        Ok(Passage::new(
            text(schema.id_field, "id")?,
            text(schema.title_field, "title")?,
            text(schema.context_field, "context")?,
            start_index,
            text(schema.dataset_field, "dataset")?,
            text(schema.dataset_key_field, "dataset_key")?,
        )
        .with_metadata(metadata))
    }
}

#[async_trait]
impl LexicalBackend for TantivyBackend {
    fn index_name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        dataset_key: &str,
        limit: usize,
    ) -> RagResult<Vec<ScoredPassage>> {
        Ok(self.search_passages(query, dataset_key, limit)?)
    }

    async fn insert(&self, passages: &[Passage]) -> RagResult<()> {
        Ok(self.add_passages(passages)?)
    }

    async fn delete_dataset(&self, dataset_key: &str) -> RagResult<()> {
        Ok(self.delete_dataset_key(dataset_key)?)
    }

    async fn count(&self, key: RelevanceKey, ids: &[String], dataset_key: &str) -> RagResult<u64> {
        Ok(self.count_matching(key, ids, dataset_key)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn backend() -> TantivyBackend {
        TantivyBackend::in_memory(&LexicalSettings::default()).unwrap()
    }

    fn passage(id: &str, context: &str, dataset_key: &str) -> Passage {
        Passage::new(id, "Tytuł", context, 0, "ipipan/polqa", dataset_key)
    }

    #[test]
    fn search_is_scoped_to_dataset_key() {
        let backend = backend();
        backend
            .add_passages(&[
                passage("1", "Warszawa jest stolicą Polski", "a"),
                passage("2", "Kraków leży nad Wisłą", "a"),
                passage("3", "Warszawa leży nad Wisłą", "b"),
            ])
            .unwrap();

        let hits = backend.search_passages("Warszawa", "a", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].passage.id, "1");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn zero_limit_returns_nothing() {
        let backend = backend();
        backend.add_passages(&[passage("1", "Warszawa", "a")]).unwrap();
        assert!(backend.search_passages("Warszawa", "a", 0).unwrap().is_empty());
    }

    #[test]
    fn malformed_query_is_parsed_leniently() {
        let backend = backend();
        backend.add_passages(&[passage("1", "Warszawa", "a")]).unwrap();
        let hits = backend.search_passages("Warszawa AND (", "a", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn stored_fields_round_trip() {
        let backend = backend();
        let mut metadata = Metadata::new();
        metadata.insert("passage_id".into(), json!("src-1"));
        let original = Passage::new("7", "Tytuł", "Gdańsk nad morzem", 42, "ipipan/polqa", "k")
            .with_metadata(metadata);
        backend.add_passages(std::slice::from_ref(&original)).unwrap();

        let hit = &backend.search_passages("Gdańsk", "k", 1).unwrap()[0].passage;
        assert_eq!(hit, &original);
        assert_eq!(hit.start_index, 42);
        assert_eq!(hit.source_passage_id().as_deref(), Some("src-1"));
    }

    #[test]
    fn counts_by_relevance_key() {
        let backend = backend();
        let mut chunk = passage("c1", "Poznań", "k");
        chunk.metadata.insert("passage_id".into(), json!("src"));
        backend
            .add_passages(&[chunk, passage("c2", "Łódź", "k"), passage("c3", "Lublin", "other")])
            .unwrap();

        let ids = vec!["c2".to_string(), "c3".to_string()];
        assert_eq!(backend.count_matching(RelevanceKey::PassageId, &ids, "k").unwrap(), 1);
        assert_eq!(
            backend
                .count_matching(RelevanceKey::SourcePassageId, &["src".to_string()], "k")
                .unwrap(),
            1
        );
        assert_eq!(backend.count_matching(RelevanceKey::PassageId, &[], "k").unwrap(), 0);
    }

    #[test]
    fn delete_removes_only_one_dataset() {
        let backend = backend();
        backend
            .add_passages(&[passage("1", "Toruń", "a"), passage("2", "Toruń", "b")])
            .unwrap();
        backend.delete_dataset_key("a").unwrap();

        assert!(backend.search_passages("Toruń", "a", 5).unwrap().is_empty());
        assert_eq!(backend.search_passages("Toruń", "b", 5).unwrap().len(), 1);
    }

    #[test]
    fn reopens_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LexicalSettings {
            index_dir: dir.path().to_path_buf(),
            ..LexicalSettings::default()
        };
        {
            let backend = TantivyBackend::open(&settings).unwrap();
            backend.add_passages(&[passage("1", "Szczecin", "a")]).unwrap();
        }
        let backend = TantivyBackend::open(&settings).unwrap();
        assert_eq!(backend.num_docs(), 1);
        assert_eq!(backend.directory(), Some(dir.path().join("basic_index").as_path()));
    }
}
