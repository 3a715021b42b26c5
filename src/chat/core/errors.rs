//! Error types for the chat subsystem.

use thiserror::Error;

use crate::llm::LlmError;

/// Chat subsystem error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No session is bound to the request.
    #[error("authentication required")]
    AuthenticationRequired,
    /// Invalid request input (empty message, missing id, bad credentials shape).
    #[error("{0}")]
    Validation(String),
    /// Completion credentials are missing; no upstream call was attempted.
    #[error("completion service is not configured")]
    NotConfigured,
    /// Conversation or user does not exist for the caller.
    ///
    /// Ownership violations are reported through this variant as well.
    #[error("not found")]
    NotFound,
    /// Username already registered.
    #[error("username already taken")]
    Conflict,
    /// Credentials did not match.
    #[error("invalid username or password")]
    InvalidCredentials,
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    /// Completion or speech service failure.
    #[error("upstream error: {0}")]
    Upstream(#[from] LlmError),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl ChatError {
    /// Whether this failure belongs to the storage layer.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(_) | Self::TokioSqlite(_) | Self::CorruptRecord(_)
        )
    }

    /// Whether the caller may log this failure and carry on.
    ///
    /// Storage and upstream failures degrade the response; everything else
    /// terminates the current request.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.is_storage() || matches!(self, Self::Upstream(_))
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
