use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{ConfigError, RagResult},
    evaluation::{QaEvaluator, RetrievalEvaluator},
    generation::Generator,
    passage::Passage,
    retrieval::Retriever,
};

/// One benchmark question with its ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationInput {
    pub question: String,
    #[serde(default)]
    pub gold_answers: Vec<String>,
    /// Identities of the passages that justify the answer.
    pub passage_ids: Vec<String>,
}

impl EvaluationInput {
    pub fn new(question: impl Into<String>, passage_ids: Vec<String>) -> Self {
        Self {
            question: question.into(),
            gold_answers: Vec::new(),
            passage_ids,
        }
    }

    pub fn with_gold_answers(mut self, gold_answers: Vec<String>) -> Self {
        self.gold_answers = gold_answers;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvaluation {
    pub question: String,
    pub ndcg: f64,
    pub mrr: f64,
    pub recall: f64,
    pub accuracy: f64,
    pub answer: Option<String>,
    pub exact_match: Option<f64>,
    pub f1: Option<f64>,
}

/// Means over every evaluated question. All zeros for an empty run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub dataset_key: String,
    pub k: usize,
    pub queries: usize,
    pub ndcg: f64,
    pub mrr: f64,
    pub recall: f64,
    pub accuracy: f64,
    /// Present when answers were generated.
    pub exact_match: Option<f64>,
    pub f1: Option<f64>,
    pub per_query: Vec<QueryEvaluation>,
}

/// Drives a retriever (and optionally a generator) over benchmark questions.
pub struct EvaluationRun {
    retriever: Arc<dyn Retriever>,
    evaluator: RetrievalEvaluator,
    generator: Option<Arc<dyn Generator>>,
    k: usize,
}

impl EvaluationRun {
    pub fn new(retriever: Arc<dyn Retriever>, k: usize) -> Result<Self, ConfigError> {
        if k == 0 {
            return Err(ConfigError::Invalid {
                field: "k",
                message: "must be at least 1".into(),
            });
        }
        let evaluator = RetrievalEvaluator::for_dataset_key(retriever.dataset_key());
        Ok(Self {
            retriever,
            evaluator,
            generator: None,
            k,
        })
    }

    pub fn with_evaluator(mut self, evaluator: RetrievalEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub async fn evaluate_one(&self, input: &EvaluationInput) -> RagResult<QueryEvaluation> {
        let result = self
            .retriever
            .get_relevant_passages(&input.question, self.k)
            .await?;
        let total_relevant = self
            .retriever
            .count_relevant_documents(&input.passage_ids)
            .await?;
        let ids = &input.passage_ids;

        let (answer, exact_match, f1) = match &self.generator {
            Some(generator) => {
                let passages: Vec<Passage> =
                    result.iter().map(|scored| scored.passage.clone()).collect();
                let answer = generator.generate_answer(&input.question, &passages).await?;
                let exact_match = QaEvaluator.best_em(&answer, &input.gold_answers);
                let f1 = QaEvaluator.best_f1(&answer, &input.gold_answers);
                (Some(answer), Some(exact_match), Some(f1))
            }
            None => (None, None, None),
        };

        let evaluation = QueryEvaluation {
            question: input.question.clone(),
            ndcg: self.evaluator.ndcg(&result, ids),
            mrr: self.evaluator.mrr(&result, ids),
            recall: self.evaluator.recall(&result, ids, total_relevant, self.k),
            accuracy: self.evaluator.accuracy(&result, ids),
            answer,
            exact_match,
            f1,
        };
        debug!(
            question = %input.question,
            hits = result.len(),
            total_relevant,
            ndcg = evaluation.ndcg,
            "Evaluated question"
        );
        Ok(evaluation)
    }

    /// Questions are evaluated one at a time; the first backend error aborts
    /// the run.
    pub async fn run(&self, inputs: &[EvaluationInput]) -> RagResult<EvaluationReport> {
        let mut per_query = Vec::with_capacity(inputs.len());
        for input in inputs {
            per_query.push(self.evaluate_one(input).await?);
        }

        let report = EvaluationReport {
            dataset_key: self.retriever.dataset_key().to_string(),
            k: self.k,
            queries: per_query.len(),
            ndcg: mean(per_query.iter().map(|q| q.ndcg)),
            mrr: mean(per_query.iter().map(|q| q.mrr)),
            recall: mean(per_query.iter().map(|q| q.recall)),
            accuracy: mean(per_query.iter().map(|q| q.accuracy)),
            exact_match: self
                .generator
                .as_ref()
                .map(|_| mean(per_query.iter().filter_map(|q| q.exact_match))),
            f1: self
                .generator
                .as_ref()
                .map(|_| mean(per_query.iter().filter_map(|q| q.f1))),
            per_query,
        };
        info!(
            dataset_key = %report.dataset_key,
            queries = report.queries,
            k = report.k,
            ndcg = report.ndcg,
            mrr = report.mrr,
            recall = report.recall,
            accuracy = report.accuracy,
            "Evaluation finished"
        );
        Ok(report)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::passage::{RetrievalResult, ScoredPassage};

    /// Always ranks `x`, `a`, `y`; two documents are relevant per question.
    struct FixedRetriever;

    #[async_trait]
    impl Retriever for FixedRetriever {
        fn dataset_key(&self) -> &str {
            "clarin-knext-poquad-test"
        }

        async fn get_relevant_passages(
            &self,
            query: &str,
            size: usize,
        ) -> RagResult<RetrievalResult> {
            let mut passages: Vec<ScoredPassage> = ["x", "a", "y"]
                .iter()
                .map(|id| ScoredPassage::new(Passage::new(*id, "", "Warszawa", 0, "d", "k"), 1.0))
                .collect();
            passages.truncate(size);
            Ok(RetrievalResult::new(query, passages))
        }

        async fn count_relevant_documents(&self, _passage_ids: &[String]) -> RagResult<u64> {
            Ok(2)
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate_answer(&self, _query: &str, passages: &[Passage]) -> RagResult<String> {
            Ok(passages
                .first()
                .map(|p| p.context.clone())
                .unwrap_or_default())
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn averages_ranking_metrics() {
        let run = EvaluationRun::new(Arc::new(FixedRetriever), 3).unwrap();
        let inputs = vec![
            EvaluationInput::new("q1", ids(&["a"])),
            EvaluationInput::new("q2", ids(&["x"])),
        ];

        let report = run.run(&inputs).await.unwrap();
        assert_eq!(report.queries, 2);
        assert_eq!(report.k, 3);
        assert!((report.mrr - 0.75).abs() < 1e-12);
        assert!((report.accuracy - 0.5).abs() < 1e-12);
        assert!((report.recall - 0.5).abs() < 1e-12);
        assert_eq!(report.exact_match, None);
    }

    #[tokio::test]
    async fn scores_generated_answers() {
        let run = EvaluationRun::new(Arc::new(FixedRetriever), 3)
            .unwrap()
            .with_generator(Arc::new(EchoGenerator));
        let inputs = vec![
            EvaluationInput::new("q1", ids(&["a"])).with_gold_answers(ids(&["warszawa"])),
            EvaluationInput::new("q2", ids(&["a"])).with_gold_answers(ids(&["kraków"])),
        ];

        let report = run.run(&inputs).await.unwrap();
        assert_eq!(report.exact_match, Some(0.5));
        assert_eq!(report.f1, Some(0.5));
        assert_eq!(report.per_query[0].answer.as_deref(), Some("Warszawa"));
    }

    #[tokio::test]
    async fn empty_run_reports_zeros() {
        let run = EvaluationRun::new(Arc::new(FixedRetriever), 5).unwrap();
        let report = run.run(&[]).await.unwrap();
        assert_eq!(report.queries, 0);
        assert_eq!(report.ndcg, 0.0);
    }

    #[test]
    fn rejects_zero_k() {
        assert!(EvaluationRun::new(Arc::new(FixedRetriever), 0).is_err());
    }
}
