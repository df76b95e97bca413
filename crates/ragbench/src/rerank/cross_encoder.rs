use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::{
    error::{RagError, RagResult},
    http::HttpEndpoint,
};

/// Scores `(query, document)` pairs jointly. Higher is more relevant; the
/// scale is model specific.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    fn model_name(&self) -> &str;

    /// One score per pair, in pair order.
    async fn predict(&self, pairs: &[(String, String)]) -> RagResult<Vec<f32>>;
}

/// Jina/Cohere-style `/rerank` endpoint: `{model, query, documents}` in,
/// `{"results": [{"index", "relevance_score"}]}` out.
pub struct HttpCrossEncoder {
    endpoint: HttpEndpoint,
}

impl HttpCrossEncoder {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }

    async fn score_documents(&self, query: &str, documents: &[&str]) -> RagResult<Vec<f32>> {
        let body = json!({
            "model": self.endpoint.model(),
            "query": query,
            "documents": documents,
            "top_n": documents.len(),
        });
        let response = self.endpoint.post_json("rerank", "rerank", &body).await?;
        parse_rerank_response(&response, documents.len())
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    fn model_name(&self) -> &str {
        self.endpoint.model()
    }

    async fn predict(&self, pairs: &[(String, String)]) -> RagResult<Vec<f32>> {
        let mut scores = Vec::with_capacity(pairs.len());
        for group in group_by_query(pairs) {
            let query = group[0].0.as_str();
            let documents: Vec<&str> = group.iter().map(|(_, doc)| doc.as_str()).collect();
            scores.extend(self.score_documents(query, &documents).await?);
        }
        debug!(model = self.endpoint.model(), pairs = pairs.len(), "Scored pairs");
        Ok(scores)
    }
}

/// Runs of consecutive pairs sharing a query, so each run is one request.
fn group_by_query(pairs: &[(String, String)]) -> Vec<&[(String, String)]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for index in 1..=pairs.len() {
        if index == pairs.len() || pairs[index].0 != pairs[start].0 {
            groups.push(&pairs[start..index]);
            start = index;
        }
    }
    groups
}

/// Scores placed back at their document index. Every document must be
/// scored exactly once.
fn parse_rerank_response(response: &serde_json::Value, documents: usize) -> RagResult<Vec<f32>> {
    let results = response
        .get("results")
        .and_then(|results| results.as_array())
        .ok_or_else(|| RagError::invalid_response("rerank", "missing results array"))?;

    let mut scores: Vec<Option<f32>> = vec![None; documents];
    for result in results {
        let index = result
            .get("index")
            .and_then(|index| index.as_u64())
            .ok_or_else(|| RagError::invalid_response("rerank", "missing index"))?
            as usize;
        let score = result
            .get("relevance_score")
            .and_then(|score| score.as_f64())
            .ok_or_else(|| RagError::invalid_response("rerank", "missing relevance_score"))?;
        let slot = scores.get_mut(index).ok_or_else(|| {
            RagError::invalid_response(
                "rerank",
                format!("index {index} out of range for {documents} documents"),
            )
        })?;
        if slot.replace(score as f32).is_some() {
            return Err(RagError::invalid_response(
                "rerank",
                format!("document {index} scored twice"),
            ));
        }
    }

    let scored = scores.iter().flatten().count();
    if scored < documents {
        warn!(returned = scored, documents, "Rerank service left documents unscored");
        return Err(RagError::invalid_response(
            "rerank",
            format!("expected {documents} scores, got {scored}"),
        ));
    }
    Ok(scores.into_iter().flatten().collect())
}
