use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::{
    error::{RagError, RagResult},
    http::HttpEndpoint,
};

/// A text-completion language model.
#[async_trait]
pub trait Completion: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, max_tokens: usize) -> RagResult<String>;
}

/// OpenAI-compatible `/chat/completions` endpoint; the prompt is sent as a
/// single user message.
pub struct HttpCompletion {
    endpoint: HttpEndpoint,
    temperature: f32,
}

impl HttpCompletion {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            endpoint,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl Completion for HttpCompletion {
    fn model_name(&self) -> &str {
        self.endpoint.model()
    }

    async fn complete(&self, prompt: &str, max_tokens: usize) -> RagResult<String> {
        let body = json!({
            "model": self.endpoint.model(),
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": self.temperature,
        });
        let response = self
            .endpoint
            .post_json("completion", "chat/completions", &body)
            .await?;
        let text = parse_completion(&response)?;
        debug!(model = self.endpoint.model(), chars = text.len(), "Completion received");
        Ok(text)
    }
}

fn parse_completion(response: &serde_json::Value) -> RagResult<String> {
    response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::invalid_response("completion", "missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_first_choice() {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "Warszawa"}}]
        });
        assert_eq!(parse_completion(&response).unwrap(), "Warszawa");
        assert!(parse_completion(&json!({"choices": []})).is_err());
    }
}
