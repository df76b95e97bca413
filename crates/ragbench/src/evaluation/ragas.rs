use std::{collections::HashSet, sync::Arc};

use ragbench_cache::{Cache, CacheKey, Namespace};
use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    config::EvaluationSettings,
    error::RagResult,
    generation::Completion,
    passage::{RelevanceKey, RetrievalResult},
    rerank::CrossEncoder,
    vector::Vectorizer,
};

/// Per-component scores behind a RAGAS composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RagasScore {
    pub context_precision: f64,
    pub context_recall: f64,
    pub faithfulness: f64,
    pub answer_relevance: f64,
    /// Present only when gold answers were supplied.
    pub answer_correctness: Option<f64>,
    pub score: f64,
}

/// Reference-free RAG quality metrics.
///
/// Retrieval components use binary relevance against known passage ids.
/// Answer components rely on a cross-encoder (faithfulness), a completion
/// model that writes back-questions (answer relevance), and an embedding
/// model (similarities). Model-backed scores are cached.
pub struct RagasEvaluator {
    cross_encoder: Arc<dyn CrossEncoder>,
    completion: Arc<dyn Completion>,
    vectorizer: Arc<dyn Vectorizer>,
    cache: Arc<Cache>,
    settings: EvaluationSettings,
    relevance_key: RelevanceKey,
}

impl RagasEvaluator {
    pub fn new(
        cross_encoder: Arc<dyn CrossEncoder>,
        completion: Arc<dyn Completion>,
        vectorizer: Arc<dyn Vectorizer>,
        cache: Arc<Cache>,
        settings: EvaluationSettings,
    ) -> Self {
        Self {
            cross_encoder,
            completion,
            vectorizer,
            cache,
            settings,
            relevance_key: RelevanceKey::default(),
        }
    }

    pub fn with_relevance_key(mut self, relevance_key: RelevanceKey) -> Self {
        self.relevance_key = relevance_key;
        self
    }

    pub fn settings(&self) -> &EvaluationSettings {
        &self.settings
    }

    /// Mean of precision@i over the ranks `i` holding a relevant passage.
    pub fn context_precision(&self, result: &RetrievalResult, correct_ids: &[String]) -> f64 {
        let mut hits = 0usize;
        let mut total = 0.0;
        for (rank, scored) in result.iter().enumerate() {
            if self.relevance_key.matches(&scored.passage, correct_ids) {
                hits += 1;
                total += hits as f64 / (rank + 1) as f64;
            }
        }
        if hits == 0 {
            return 0.0;
        }
        total / hits as f64
    }

    /// `1.0` iff any retrieved passage is relevant.
    pub fn context_recall(&self, result: &RetrievalResult, correct_ids: &[String]) -> f64 {
        let found = result
            .iter()
            .any(|scored| self.relevance_key.matches(&scored.passage, correct_ids));
        if found {
            1.0
        } else {
            0.0
        }
    }

    /// How well each answer sentence is supported by some context sentence.
    ///
    /// Every answer sentence takes its best cross-encoder score against the
    /// context sentences, squashed through a steep sigmoid; the result is the
    /// mean over answer sentences.
    pub async fn faithfulness(&self, result: &RetrievalResult, answer: &str) -> RagResult<f64> {
        if answer.trim().is_empty() {
            return Ok(0.0);
        }
        let context = result.contexts().collect::<Vec<_>>().join(" ");
        let answer_sentences = split_sentences(answer);
        let context_sentences = split_sentences(&context);
        if answer_sentences.is_empty() || context_sentences.is_empty() {
            return Ok(0.0);
        }

        let key = CacheKey::new(Namespace::Faithfulness)
            .field("model", self.cross_encoder.model_name())
            .field("answer", answer)
            .field("context", &context)
            .build();
        if let Some(score) = self.cache.get::<f64>(&key).await? {
            return Ok(score);
        }

        let mut total = 0.0;
        for sentence in &answer_sentences {
            let pairs: Vec<(String, String)> = context_sentences
                .iter()
                .map(|ctx| (sentence.to_string(), ctx.to_string()))
                .collect();
            let scores = self.cross_encoder.predict(&pairs).await?;
            let best = scores.into_iter().fold(f32::NEG_INFINITY, f32::max);
            total += sigmoid(f64::from(self.settings.faithfulness_steepness) * f64::from(best));
        }
        let score = total / answer_sentences.len() as f64;

        debug!(sentences = answer_sentences.len(), score, "Faithfulness computed");
        self.cache.set(&key, &score).await?;
        Ok(score)
    }

    /// Mean similarity between the question and questions the completion
    /// model writes for the answer.
    pub async fn answer_relevance(&self, question: &str, answer: &str) -> RagResult<f64> {
        if answer.trim().is_empty() {
            return Ok(0.0);
        }

        let key = CacheKey::new(Namespace::AnswerRelevance)
            .field("model", self.completion.model_name())
            .field("question", question)
            .field("answer", answer)
            .build();
        if let Some(score) = self.cache.get::<f64>(&key).await? {
            return Ok(score);
        }

        let count = self.settings.back_question_count;
        let reply = self
            .completion
            .complete(
                &back_question_prompt(answer, count),
                self.settings.back_question_max_tokens,
            )
            .await?;
        let questions = parse_back_questions(&reply, count);
        if questions.is_empty() {
            debug!("No back-questions parsed from completion");
            return Ok(0.0);
        }

        let prefix = &self.settings.question_prefix;
        let question_vector = self
            .vectorizer
            .get_vector(&format!("{prefix}{question}"))
            .await?;
        let mut total = 0.0;
        for generated in &questions {
            let vector = self
                .vectorizer
                .get_vector(&format!("{prefix}{generated}"))
                .await?;
            total += f64::from(self.vectorizer.similarity(&question_vector, &vector));
        }
        let score = total / questions.len() as f64;

        self.cache.set(&key, &score).await?;
        Ok(score)
    }

    /// Rank-weighted (1/rank) mean similarity between the query and each
    /// retrieved context.
    pub async fn query_to_context_relevance(&self, result: &RetrievalResult) -> RagResult<f64> {
        if result.is_empty() {
            return Ok(0.0);
        }

        let key = CacheKey::new(Namespace::ContextRelevance)
            .field("model", self.vectorizer.model_name())
            .field("query", &result.query)
            .list("contexts", result.contexts())
            .build();
        if let Some(score) = self.cache.get::<f64>(&key).await? {
            return Ok(score);
        }

        let query_vector = self
            .vectorizer
            .get_vector(&format!("{}{}", self.settings.question_prefix, result.query))
            .await?;
        let mut weighted = 0.0;
        let mut weights = 0.0;
        for (rank, context) in result.contexts().enumerate() {
            let vector = self.vectorizer.get_vector(context).await?;
            let weight = 1.0 / (rank + 1) as f64;
            weighted += f64::from(self.vectorizer.similarity(&query_vector, &vector)) * weight;
            weights += weight;
        }
        let score = weighted / weights;

        self.cache.set(&key, &score).await?;
        Ok(score)
    }

    /// Blend of the best embedding similarity and the best word-set Jaccard
    /// overlap against the gold answers.
    pub async fn answer_correctness(&self, answer: &str, golds: &[String]) -> RagResult<f64> {
        if answer.trim().is_empty() || golds.is_empty() {
            return Ok(0.0);
        }

        let answer_vector = self.vectorizer.get_vector(answer).await?;
        let mut semantic = f64::NEG_INFINITY;
        for gold in golds {
            let gold_vector = self.vectorizer.get_vector(gold).await?;
            semantic = semantic.max(f64::from(
                self.vectorizer.similarity(&answer_vector, &gold_vector),
            ));
        }
        let keyword = golds
            .iter()
            .map(|gold| jaccard(answer, gold))
            .fold(0.0, f64::max);

        Ok(f64::from(self.settings.semantic_weight) * semantic
            + f64::from(self.settings.keyword_weight) * keyword)
    }

    pub async fn ragas_score(
        &self,
        result: &RetrievalResult,
        correct_ids: &[String],
        answer: &str,
        golds: &[String],
    ) -> RagResult<RagasScore> {
        let context_precision = self.context_precision(result, correct_ids);
        let context_recall = self.context_recall(result, correct_ids);
        let faithfulness = self.faithfulness(result, answer).await?;
        let answer_relevance = self.answer_relevance(&result.query, answer).await?;

        let settings = &self.settings;
        let base = f64::from(settings.retrieval_weight) * (context_precision + context_recall) / 2.0
            + f64::from(settings.answer_quality_weight) * (faithfulness + answer_relevance) / 2.0;

        let answer_correctness = if golds.is_empty() {
            None
        } else {
            Some(self.answer_correctness(answer, golds).await?)
        };
        let score = match answer_correctness {
            Some(correctness) => {
                f64::from(settings.base_weight) * base
                    + f64::from(settings.correctness_weight) * correctness
            }
            None => base,
        };

        Ok(RagasScore {
            context_precision,
            context_recall,
            faithfulness,
            answer_relevance,
            answer_correctness,
            score,
        })
    }

    pub async fn ragas(
        &self,
        result: &RetrievalResult,
        correct_ids: &[String],
        answer: &str,
        golds: &[String],
    ) -> RagResult<f64> {
        Ok(self
            .ragas_score(result, correct_ids, answer, golds)
            .await?
            .score)
    }

    /// Weighted blend of faithfulness, answer relevance and query-to-context
    /// relevance. Higher means less hallucination.
    pub async fn hallucination(&self, result: &RetrievalResult, answer: &str) -> RagResult<f64> {
        let faithfulness = self.faithfulness(result, answer).await?;
        let answer_relevance = self.answer_relevance(&result.query, answer).await?;
        let context_relevance = self.query_to_context_relevance(result).await?;

        let settings = &self.settings;
        Ok(
            f64::from(settings.hallucination_faithfulness_weight) * faithfulness
                + f64::from(settings.hallucination_answer_relevance_weight) * answer_relevance
                + f64::from(settings.hallucination_context_relevance_weight) * context_relevance,
        )
    }
}

fn back_question_prompt(answer: &str, count: usize) -> String {
    let template = (1..=count)
        .map(|n| format!("{n}. [pytanie]"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Wygeneruj dokładnie {count} pytania, na które podany tekst mógłby być odpowiedzią. \
         Pytania powinny być konkretne i istotne.\n\n\
         Tekst: {}\n\n\
         Wygeneruj pytania w formacie:\n{template}\n\n\
         Pytania:",
        answer.replace('\n', " ")
    )
}

/// Questions from a completion reply. Numbered lines (`1.` .. `count.`) are
/// preferred; when fewer than `count` parse, the first `count` non-empty
/// lines are taken with list markers stripped. Questions of five characters
/// or fewer are dropped.
pub(crate) fn parse_back_questions(reply: &str, count: usize) -> Vec<String> {
    let numbered: Vec<String> = reply
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > 3)
        .filter_map(|line| {
            (1..=count)
                .find_map(|n| line.strip_prefix(&format!("{n}.")))
                .map(str::trim)
        })
        .filter(|question| question.chars().count() > 5)
        .take(count)
        .map(str::to_string)
        .collect();
    if numbered.len() >= count {
        return numbered;
    }

    let markers: Vec<String> = (1..=count)
        .flat_map(|n| [format!("{n}."), format!("{n})")])
        .chain(["-".to_string(), "*".to_string()])
        .collect();
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(count)
        .map(|line| {
            markers.iter().fold(line, |line, marker| {
                line.strip_prefix(marker.as_str()).map_or(line, str::trim)
            })
        })
        .filter(|question| question.chars().count() > 5)
        .map(str::to_string)
        .collect()
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn jaccard(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}
