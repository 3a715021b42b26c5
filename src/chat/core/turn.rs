//! Chat turn model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chat::core::ids::{ConversationId, UserId};

/// Author of a turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// End user input.
    User,
    /// Model reply.
    Assistant,
}

impl Sender {
    /// Stable string form for storage and the JSON API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Label used when rendering transcripts for the model.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // The browser client historically labels replies "ai".
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" | "ai" | "bot" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// A single stored message of a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Store-assigned sequence number; breaks timestamp ties.
    pub id: i64,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Owner of the conversation.
    pub user_id: UserId,
    /// Message text.
    pub message: String,
    /// Author of the message.
    pub sender: Sender,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// A turn that has not been written yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTurn {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Owner of the conversation.
    pub user_id: UserId,
    /// Message text.
    pub message: String,
    /// Author of the message.
    pub sender: Sender,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl NewTurn {
    /// Build a user turn stamped now.
    #[must_use]
    pub fn user(
        conversation_id: ConversationId,
        user_id: UserId,
        message: impl Into<String>,
    ) -> Self {
        Self::new(conversation_id, user_id, Sender::User, message)
    }

    /// Build an assistant turn stamped now.
    #[must_use]
    pub fn assistant(
        conversation_id: ConversationId,
        user_id: UserId,
        message: impl Into<String>,
    ) -> Self {
        Self::new(conversation_id, user_id, Sender::Assistant, message)
    }

    /// Build a turn stamped now.
    #[must_use]
    pub fn new(
        conversation_id: ConversationId,
        user_id: UserId,
        sender: Sender,
        message: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            user_id,
            message: message.into(),
            sender,
            timestamp: Utc::now(),
        }
    }
}
