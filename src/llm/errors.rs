//! Errors produced by the upstream HTTP clients.

use thiserror::Error;

/// Completion and speech client error type.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured; the request was never sent.
    #[error("missing API credentials")]
    MissingCredentials,
    /// The request did not complete within the client timeout.
    #[error("request timed out")]
    Timeout,
    /// Upstream rejected the credentials.
    #[error("upstream rejected credentials (status {0})")]
    Unauthorized(u16),
    /// HTTP response was not a success.
    #[error("upstream http status not ok: {0}")]
    HttpStatusNotOk(u16),
    /// The response body lacked the expected fields.
    #[error("upstream response malformed: {0}")]
    MalformedResponse(String),
    /// Input rejected before any request was made.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// HTTP client error.
    #[error("http client error: {0}")]
    HttpClient(reqwest::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for LlmError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::MalformedResponse(value.to_string())
        } else {
            Self::HttpClient(value)
        }
    }
}

/// Convenience result alias for upstream calls.
pub type LlmResult<T> = Result<T, LlmError>;
