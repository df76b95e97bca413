//! End-to-end benchmark workflow: settings from TOML, an on-disk tantivy
//! index and disk cache, batch import, reranked retrieval, answer generation
//! and evaluation. Cached work survives reopening the cache directory.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use ragbench::{
    config::RagSettings,
    evaluation::{EvaluationInput, EvaluationRun, RagasEvaluator},
    generation::{Completion, InstructionGenerator},
    lexical::TantivyBackend,
    rerank::CrossEncoder,
    Cache, CrossEncoderReranker, LexicalRepository, Namespace, Passage, PassageImporter,
    RagResult, Reranker, RepositoryRetriever, RetrievalResult, Retriever, ScoredPassage,
    Vectorizer,
};
use tempfile::TempDir;

const DATASET_KEY: &str = "clarin-pl-poquad-validation";

fn corpus() -> Vec<Passage> {
    [
        ("w1", "Warszawa jest stolicą Polski."),
        ("w2", "Kraków był dawniej stolicą Polski."),
        ("w3", "Wisła przepływa przez Warszawę i Kraków."),
        ("w4", "Tatry są najwyższymi górami w Polsce."),
    ]
    .into_iter()
    .map(|(id, text)| Passage::new(id, "", text, 0, "clarin-pl/poquad", DATASET_KEY))
    .collect()
}

/// Answers generation prompts with a fixed reply and back-question prompts
/// with the same question three times.
struct ScriptedCompletion {
    calls: AtomicUsize,
}

#[async_trait]
impl Completion for ScriptedCompletion {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, _max_tokens: usize) -> RagResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.starts_with("Wygeneruj") {
            Ok("1. Jaka jest stolica Polski?\n2. Jaka jest stolica Polski?\n3. Jaka jest stolica Polski?".into())
        } else {
            Ok("Warszawa.".into())
        }
    }
}

struct OverlapEncoder {
    calls: AtomicUsize,
}

#[async_trait]
impl CrossEncoder for OverlapEncoder {
    fn model_name(&self) -> &str {
        "overlap"
    }

    async fn predict(&self, pairs: &[(String, String)]) -> RagResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(pairs
            .iter()
            .map(|(query, document)| {
                let query = query.to_lowercase();
                let document = document.to_lowercase();
                let words: HashSet<&str> = document
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .collect();
                query
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| words.contains(w))
                    .count() as f32
            })
            .collect())
    }
}

struct LetterVectorizer;

#[async_trait]
impl Vectorizer for LetterVectorizer {
    fn model_name(&self) -> &str {
        "letters"
    }

    async fn get_vector(&self, text: &str) -> RagResult<Vec<f32>> {
        let mut vector = vec![0.0; 26];
        for byte in text.to_ascii_lowercase().bytes() {
            if byte.is_ascii_lowercase() {
                vector[usize::from(byte - b'a')] += 1.0;
            }
        }
        Ok(vector)
    }
}

fn settings(dir: &TempDir) -> anyhow::Result<RagSettings> {
    let root = dir.path().display();
    let settings = RagSettings::from_toml_str(&format!(
        r#"
        [cache]
        backend = "disk"
        path = "{root}/cache"

        [lexical]
        index_dir = "{root}/indexes"

        [retrieval]
        default_size = 2

        [import]
        batch_size = 3
        "#
    ))?;
    Ok(settings)
}

#[tokio::test]
async fn benchmark_run_with_disk_cache() -> anyhow::Result<()> {
    ragbench::telemetry::init_tracing();
    let dir = TempDir::new()?;
    let settings = settings(&dir)?;

    let backend = Arc::new(TantivyBackend::open(&settings.lexical)?);
    let cache = Arc::new(settings.cache.build_cache());
    let repository = Arc::new(LexicalRepository::new(backend.clone(), cache.clone()));

    let stats = PassageImporter::from_settings(&settings.import)?
        .import_passages(repository.as_ref(), corpus())
        .await?;
    assert_eq!(stats.batches, 2);
    assert_eq!(stats.passages, 4);

    let encoder = Arc::new(OverlapEncoder {
        calls: AtomicUsize::new(0),
    });
    let completion = Arc::new(ScriptedCompletion {
        calls: AtomicUsize::new(0),
    });
    let retriever = Arc::new(
        RepositoryRetriever::new(repository.clone(), DATASET_KEY)
            .with_reranker(Arc::new(CrossEncoderReranker::new(encoder.clone(), cache.clone())))
            .with_overfetch(settings.retrieval.rerank_overfetch)?,
    );

    let question = "Jaka jest stolica Polski?";
    let result = retriever
        .get_relevant_passages(question, settings.retrieval.default_size)
        .await?;
    assert_eq!(result.len(), 2);
    assert_eq!(result.top().map(|hit| hit.score), Some(1.0));
    assert!(result.iter().all(|hit| (0.0..=1.0).contains(&hit.score)));

    let run = EvaluationRun::new(retriever.clone(), settings.retrieval.default_size)?
        .with_generator(Arc::new(InstructionGenerator::new(
            completion.clone(),
            cache.clone(),
        )));
    let inputs = vec![EvaluationInput::new(question, vec!["w1".into(), "w2".into()])
        .with_gold_answers(vec!["Warszawa".into()])];
    let report = run.run(&inputs).await?;
    assert_eq!(report.queries, 1);
    assert_eq!(report.recall, 1.0);
    assert_eq!(report.exact_match, Some(1.0));

    let ragas = RagasEvaluator::new(
        encoder.clone(),
        completion.clone(),
        Arc::new(LetterVectorizer),
        cache.clone(),
        settings.evaluation.clone(),
    );
    let score = ragas
        .ragas_score(&result, &inputs[0].passage_ids, "warszawa", &inputs[0].gold_answers)
        .await?;
    assert_eq!(score.context_recall, 1.0);
    assert!((score.answer_relevance - 1.0).abs() < 1e-6);
    assert!(score.answer_correctness.is_some());
    assert!((0.0..=1.0).contains(&score.score));

    // A fresh cache handle over the same directory serves reranks and
    // answers without calling the models again.
    let encoder_calls = encoder.calls.load(Ordering::SeqCst);
    let completion_calls = completion.calls.load(Ordering::SeqCst);
    let reopened = Arc::new(settings.cache.build_cache());
    let repository = Arc::new(LexicalRepository::new(backend, reopened.clone()));
    let retriever = Arc::new(
        RepositoryRetriever::new(repository, DATASET_KEY)
            .with_reranker(Arc::new(CrossEncoderReranker::new(encoder.clone(), reopened.clone()))),
    );
    let again = EvaluationRun::new(retriever, settings.retrieval.default_size)?
        .with_generator(Arc::new(InstructionGenerator::new(completion.clone(), reopened)))
        .run(&inputs)
        .await?;

    assert_eq!(again.ndcg, report.ndcg);
    assert_eq!(encoder.calls.load(Ordering::SeqCst), encoder_calls);
    assert_eq!(completion.calls.load(Ordering::SeqCst), completion_calls);
    Ok(())
}

#[tokio::test]
async fn clearing_a_namespace_forces_recompute() -> anyhow::Result<()> {
    let cache = Arc::new(Cache::in_memory());
    let encoder = Arc::new(OverlapEncoder {
        calls: AtomicUsize::new(0),
    });
    let reranker = CrossEncoderReranker::new(encoder.clone(), cache.clone());

    let result = RetrievalResult::new(
        "stolica",
        corpus()
            .into_iter()
            .map(|p| ScoredPassage::new(p, 0.5))
            .collect(),
    );
    reranker.rerank(result.clone(), 2, DATASET_KEY).await?;
    reranker.rerank(result.clone(), 2, DATASET_KEY).await?;
    assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);

    let removed = cache.clear_namespace(Namespace::Reranker).await?;
    assert_eq!(removed, 1);
    reranker.rerank(result, 2, DATASET_KEY).await?;
    assert_eq!(encoder.calls.load(Ordering::SeqCst), 2);
    Ok(())
}
