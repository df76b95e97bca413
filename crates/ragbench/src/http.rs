//! Shared JSON-over-HTTP plumbing for remote model endpoints.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::{RagError, RagResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A model served behind an HTTP API (OpenAI-compatible or Jina/Cohere-style).
#[derive(Clone)]
pub struct HttpEndpoint {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEndpoint {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> RagResult<Self> {
        Self::with_timeout(base_url, model, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> RagResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `path` under the base URL; an empty path is the base URL itself.
    pub fn url(&self, path: &str) -> String {
        match path.trim_start_matches('/') {
            "" => self.base_url.clone(),
            path => format!("{}/{}", self.base_url, path),
        }
    }

    /// POST `body` to `path` and decode the JSON reply. Non-2xx statuses are
    /// reported as backend errors tagged with `stage`.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        stage: &'static str,
        path: &str,
        body: &B,
    ) -> RagResult<serde_json::Value> {
        let url = self.url(path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::backend(stage, format!("{status}: {text}")));
        }
        debug!(stage, %url, "Endpoint call succeeded");
        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for HttpEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEndpoint")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}
