use crate::passage::{RelevanceKey, RetrievalResult};

/// Ranking-quality metrics with binary relevance.
///
/// A passage is relevant when its identity under the configured
/// [`RelevanceKey`] is one of the correct ids. Every metric is `0.0` for an
/// empty result.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalEvaluator {
    relevance_key: RelevanceKey,
}

impl RetrievalEvaluator {
    pub fn new(relevance_key: RelevanceKey) -> Self {
        Self { relevance_key }
    }

    pub fn for_dataset_key(dataset_key: &str) -> Self {
        Self::new(RelevanceKey::for_dataset_key(dataset_key))
    }

    pub fn relevance_key(&self) -> RelevanceKey {
        self.relevance_key
    }

    /// Binary relevance of each ranked passage.
    pub fn relevances(&self, result: &RetrievalResult, correct_ids: &[String]) -> Vec<u8> {
        result
            .iter()
            .map(|scored| u8::from(self.relevance_key.matches(&scored.passage, correct_ids)))
            .collect()
    }

    pub fn ndcg(&self, result: &RetrievalResult, correct_ids: &[String]) -> f64 {
        let relevances = self.relevances(result, correct_ids);
        let mut ideal = relevances.clone();
        ideal.sort_unstable_by(|a, b| b.cmp(a));

        let idcg = discounted_gain(&ideal);
        if idcg == 0.0 {
            return 0.0;
        }
        discounted_gain(&relevances) / idcg
    }

    pub fn mrr(&self, result: &RetrievalResult, correct_ids: &[String]) -> f64 {
        self.relevances(result, correct_ids)
            .iter()
            .position(|&rel| rel == 1)
            .map_or(0.0, |rank| 1.0 / (rank + 1) as f64)
    }

    /// Relevant passages among the top `k`, divided by
    /// `min(k, total_relevant)`.
    pub fn recall(
        &self,
        result: &RetrievalResult,
        correct_ids: &[String],
        total_relevant: u64,
        k: usize,
    ) -> f64 {
        let denominator = (k as u64).min(total_relevant);
        if denominator == 0 {
            return 0.0;
        }
        let hits = self
            .relevances(result, correct_ids)
            .iter()
            .take(k)
            .filter(|&&rel| rel == 1)
            .count();
        hits as f64 / denominator as f64
    }

    /// `1.0` iff the top passage is relevant.
    pub fn accuracy(&self, result: &RetrievalResult, correct_ids: &[String]) -> f64 {
        match result.top() {
            Some(top) if self.relevance_key.matches(&top.passage, correct_ids) => 1.0,
            _ => 0.0,
        }
    }
}

fn discounted_gain(relevances: &[u8]) -> f64 {
    relevances
        .iter()
        .enumerate()
        .map(|(i, &rel)| f64::from(rel) / ((i + 2) as f64).log2())
        .sum()
}
