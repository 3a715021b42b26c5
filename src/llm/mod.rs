//! Upstream model clients: chat completions and speech synthesis.

pub mod completion;
pub mod errors;
pub mod groq;
pub mod tts;

pub use completion::{
    CompletionBackend, CompletionFuture, CompletionRequest, PromptMessage, Role,
};
pub use errors::{LlmError, LlmResult};
pub use groq::GroqClient;
pub use tts::{TtsClient, split_for_speech};
