//! Analysis (LLM) provider seam and HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ProviderError;

/// Default HTTP timeout for analysis calls. Narrative generation is
/// slow; this bounds it well above typical completion latency.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Produces an incident narrative from a prompt and context.
///
/// The pipeline treats `complete` as a single awaited call; token
/// streaming and credential refresh are the implementation's concern.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn complete(&self, prompt: &str, context: &str) -> Result<String, ProviderError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat-completions client.
pub struct HttpAnalyst {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpAnalyst {
    pub fn new(endpoint: String, model: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            model,
            api_key,
        }
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalyst {
    async fn complete(&self, prompt: &str, context: &str) -> Result<String, ProviderError> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt },
                { "role": "user", "content": context },
            ],
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: CompletionResponse = response.json().await?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Permanent("completion returned no choices".to_string()))
    }
}
