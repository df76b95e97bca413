use std::collections::HashMap;

/// Exact-match and token-F1 scoring of generated answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct QaEvaluator;

impl QaEvaluator {
    /// `1.0` iff the answers agree after lowercasing and whitespace
    /// normalization.
    pub fn em(&self, answer: &str, gold: &str) -> f64 {
        if normalize(answer) == normalize(gold) {
            1.0
        } else {
            0.0
        }
    }

    /// Harmonic mean of token precision and recall, counting each shared
    /// whitespace token at most as often as it occurs in `gold`.
    pub fn f1(&self, answer: &str, gold: &str) -> f64 {
        let answer = normalize(answer);
        let gold = normalize(gold);
        let answer_tokens: Vec<&str> = answer.split_whitespace().collect();
        let gold_tokens: Vec<&str> = gold.split_whitespace().collect();
        if answer_tokens.is_empty() || gold_tokens.is_empty() {
            return 0.0;
        }

        let mut remaining: HashMap<&str, usize> = HashMap::new();
        for token in &gold_tokens {
            *remaining.entry(token).or_default() += 1;
        }
        let mut common = 0usize;
        for token in &answer_tokens {
            if let Some(count) = remaining.get_mut(token) {
                if *count > 0 {
                    *count -= 1;
                    common += 1;
                }
            }
        }
        if common == 0 {
            return 0.0;
        }

        let precision = common as f64 / answer_tokens.len() as f64;
        let recall = common as f64 / gold_tokens.len() as f64;
        2.0 * precision * recall / (precision + recall)
    }

    pub fn best_em(&self, answer: &str, golds: &[String]) -> f64 {
        golds
            .iter()
            .map(|gold| self.em(answer, gold))
            .fold(0.0, f64::max)
    }

    pub fn best_f1(&self, answer: &str, golds: &[String]) -> f64 {
        golds
            .iter()
            .map(|gold| self.f1(answer, gold))
            .fold(0.0, f64::max)
    }
}

/// Lowercase with runs of whitespace collapsed to one space.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
