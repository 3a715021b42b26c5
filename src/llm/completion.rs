//! Completion backend abstraction.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::llm::errors::LlmResult;

/// Boxed future type for completion calls.
pub type CompletionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Role of a prompt message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instructions and injected context.
    System,
    /// End user.
    User,
    /// Model.
    Assistant,
}

impl Role {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One message of a chat-completion prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl PromptMessage {
    /// System message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A complete request for the completion backend.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    /// Ordered prompt, system instruction first.
    pub messages: Vec<PromptMessage>,
    /// Output budget in tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Text-completion backend.
pub trait CompletionBackend: Send + Sync {
    /// Whether credentials are present; unconfigured backends must not be called.
    fn is_configured(&self) -> bool;

    /// Generate a reply for the prompt.
    ///
    /// # Errors
    /// Returns an error on transport failure, timeout, non-success status or a
    /// malformed payload.
    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_, LlmResult<String>>;
}
