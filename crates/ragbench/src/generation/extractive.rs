use std::sync::Arc;

use async_trait::async_trait;
use ragbench_cache::{Cache, CacheKey, Namespace};
use serde_json::json;
use tracing::debug;

use crate::{
    error::{ConfigError, RagError, RagResult},
    generation::{clean_text, Generator},
    http::HttpEndpoint,
    passage::Passage,
};

/// Generator kind recorded in extractive answer cache keys.
pub const QUESTION_ANSWERING_KIND: &str = "question_answering";
pub const DEFAULT_WINDOW: usize = 512;
pub const DEFAULT_OVERLAP: usize = 64;

/// A span a question-answering model selected from its context.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSpan {
    pub answer: String,
    pub score: f32,
}

/// Extractive question-answering model: picks the answer span for
/// `question` out of `context`.
#[async_trait]
pub trait SpanExtractor: Send + Sync {
    fn model_name(&self) -> &str;

    async fn extract(&self, question: &str, context: &str) -> RagResult<AnswerSpan>;
}

/// Hugging Face style question-answering endpoint:
/// `{"inputs": {"question", "context"}}` in, `{"answer", "score"}` out.
pub struct HttpSpanExtractor {
    endpoint: HttpEndpoint,
    path: String,
}

impl HttpSpanExtractor {
    /// Posts to the endpoint's base URL.
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            endpoint,
            path: String::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

#[async_trait]
impl SpanExtractor for HttpSpanExtractor {
    fn model_name(&self) -> &str {
        self.endpoint.model()
    }

    async fn extract(&self, question: &str, context: &str) -> RagResult<AnswerSpan> {
        let body = json!({
            "model": self.endpoint.model(),
            "inputs": { "question": question, "context": context },
        });
        let response = self
            .endpoint
            .post_json("question_answering", &self.path, &body)
            .await?;
        parse_span(&response)
    }
}

/// Accepts a single span object or a ranked list of them (first wins).
fn parse_span(response: &serde_json::Value) -> RagResult<AnswerSpan> {
    let span = match response.as_array() {
        Some(spans) => spans.first().ok_or_else(|| {
            RagError::invalid_response("question_answering", "empty span list")
        })?,
        None => response,
    };
    let answer = span
        .get("answer")
        .and_then(|answer| answer.as_str())
        .ok_or_else(|| RagError::invalid_response("question_answering", "missing answer"))?;
    let score = span
        .get("score")
        .and_then(|score| score.as_f64())
        .ok_or_else(|| RagError::invalid_response("question_answering", "missing score"))?;
    Ok(AnswerSpan {
        answer: answer.to_string(),
        score: score as f32,
    })
}

/// Answers with the highest-scoring span found in overlapping word windows
/// of the joined passages. Answers are cached per (query, context, kind,
/// model).
pub struct ExtractiveGenerator {
    extractor: Arc<dyn SpanExtractor>,
    cache: Arc<Cache>,
    window: usize,
    overlap: usize,
}

impl ExtractiveGenerator {
    pub fn new(extractor: Arc<dyn SpanExtractor>, cache: Arc<Cache>) -> Self {
        Self {
            extractor,
            cache,
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }

    /// Window length and overlap, in words. The overlap must be shorter
    /// than the window.
    pub fn with_window(mut self, window: usize, overlap: usize) -> Result<Self, ConfigError> {
        if window == 0 || overlap >= window {
            return Err(ConfigError::Invalid {
                field: "generation.window",
                message: format!("window {window} must exceed overlap {overlap}"),
            });
        }
        self.window = window;
        self.overlap = overlap;
        Ok(self)
    }

    pub fn cache_key(&self, query: &str, context: &str) -> String {
        CacheKey::new(Namespace::Generator)
            .field("query", query)
            .field("context", context)
            .field("prompt", QUESTION_ANSWERING_KIND)
            .field("model", self.extractor.model_name())
            .build()
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate_answer(&self, query: &str, passages: &[Passage]) -> RagResult<String> {
        let context = passages
            .iter()
            .map(|passage| passage.context.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .replace('\n', " ");

        let key = self.cache_key(query, &context);
        if let Some(answer) = self.cache.get::<String>(&key).await? {
            return Ok(answer);
        }

        let windows = word_windows(&context, self.window, self.overlap);
        if windows.is_empty() {
            return Ok(String::new());
        }

        let mut best: Option<AnswerSpan> = None;
        for window in &windows {
            let span = self.extractor.extract(query, window).await?;
            if best.as_ref().map_or(true, |best| span.score > best.score) {
                best = Some(span);
            }
        }
        let answer = best
            .map(|span| clean_text(span.answer.trim()))
            .unwrap_or_default();

        debug!(
            model = self.extractor.model_name(),
            windows = windows.len(),
            "Extracted answer"
        );
        self.cache.set(&key, &answer).await?;
        Ok(answer)
    }
}

/// Whitespace-token windows of `window` words, each starting
/// `window - overlap` words after the previous one. Stops after the first
/// window that reaches the end of the text.
pub fn word_windows(text: &str, window: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let stride = window.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + window).min(words.len());
        windows.push(words[start..end].join(" "));
        if end - start < window {
            break;
        }
        start += stride;
    }
    windows
}
