//! JSON error envelope for API handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, OptionalFromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::chat::core::errors::ChatError;
use crate::llm::errors::LlmError;

/// Apology shown when the completion service fails.
pub const UPSTREAM_APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

const INTERNAL_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Error returned by handlers as `{success: false, message}`.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status.
    pub status: StatusCode,
    /// User-facing message.
    pub message: String,
    /// Chat command echoed for chat endpoints.
    pub command: Option<&'static str>,
}

impl ApiError {
    /// Error with a status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            command: None,
        }
    }

    /// 400 with a message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Attach the `command: "error"` field chat clients expect.
    #[must_use]
    pub fn for_chat(mut self) -> Self {
        self.command = Some("error");
        self
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::AuthenticationRequired => {
                Self::new(StatusCode::UNAUTHORIZED, "Please log in to continue.")
            }
            ChatError::Validation(message) => Self::bad_request(message),
            ChatError::NotConfigured => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "The assistant is not configured: GROQ_API_KEY is missing on the server.",
            ),
            ChatError::NotFound => Self::new(StatusCode::NOT_FOUND, "Conversation not found"),
            ChatError::Conflict => Self::new(StatusCode::CONFLICT, "Username already taken"),
            ChatError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "Invalid username or password")
            }
            ChatError::Upstream(err) => err.into(),
            other => {
                error!(error = %other, "Request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
            }
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::InvalidInput(message) => Self::bad_request(message),
            LlmError::MissingCredentials => ChatError::NotConfigured.into(),
            other => {
                warn!(error = %other, "Upstream call failed");
                Self::new(StatusCode::BAD_GATEWAY, UPSTREAM_APOLOGY)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection, "Rejected request body");
        Self::new(rejection.status(), rejection.body_text())
    }
}

/// JSON body extractor whose rejections use the `{success: false, message}` envelope.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<S, T> OptionalFromRequest<S> for ApiJson<T>
where
    Json<T>: OptionalFromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let value = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(value.map(|Json(value)| Self(value)))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.command {
            Some(command) => json!({
                "success": false,
                "message": self.message,
                "response": self.message,
                "command": command,
            }),
            None => json!({
                "success": false,
                "message": self.message,
            }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_statuses() {
        let cases = [
            (ChatError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (ChatError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ChatError::NotConfigured, StatusCode::SERVICE_UNAVAILABLE),
            (ChatError::NotFound, StatusCode::NOT_FOUND),
            (ChatError::Conflict, StatusCode::CONFLICT),
            (ChatError::Upstream(LlmError::Timeout), StatusCode::BAD_GATEWAY),
            (ChatError::CorruptRecord("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn upstream_detail_is_not_exposed() {
        let err = ApiError::from(ChatError::Upstream(LlmError::MalformedResponse(
            "secret detail".into(),
        )));
        assert_eq!(err.message, UPSTREAM_APOLOGY);
    }
}
