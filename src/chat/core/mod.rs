//! Core chat types and identifiers.

pub mod config;
pub mod conversation;
pub mod errors;
pub mod ids;
pub mod turn;

pub use config::{
    AppConfig, ContextConfig, LlmConfig, ModeConfig, ModeParams, ServerConfig, StorageConfig,
    SummaryConfig, TtsConfig,
};
pub use conversation::{Conversation, PLACEHOLDER_TITLE, iso_utc, title_from_message};
pub use errors::{ChatError, ChatResult};
pub use ids::{ConversationId, UserId};
pub use turn::{NewTurn, Sender, Turn};
