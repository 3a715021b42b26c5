//! Groq chat-completions client (OpenAI-compatible wire format).
//!
//! Behaviour:
//! - One `POST` per completion, `Authorization: Bearer <key>`.
//! - The whole exchange is bounded by the configured timeout.
//! - No retries; every failure is terminal for the caller's request.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::core::config::LlmConfig;
use crate::llm::completion::{
    CompletionBackend, CompletionFuture, CompletionRequest, PromptMessage,
};
use crate::llm::errors::{LlmError, LlmResult};

/// Connect timeout, independent of the request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Async client for the Groq completion endpoint.
pub struct GroqClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl GroqClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        url::Url::parse(&config.api_url)?;
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout()))
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Model name sent with every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_completion(&self, request: CompletionRequest) -> LlmResult<String> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingCredentials)?;
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            return Err(LlmError::HttpStatusNotOk(status.as_u16()));
        }

        let parsed = response.json::<ChatCompletionResponse>().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::MalformedResponse("no completion choices".to_string()))
    }
}

impl CompletionBackend for GroqClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_, LlmResult<String>> {
        Box::pin(self.post_completion(request))
    }
}
