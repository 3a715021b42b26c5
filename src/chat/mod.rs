//! Conversation subsystem for Vocalis.
//!
//! Organized into:
//! - `core`: Configuration, errors, IDs, turns and conversations
//! - `storage`: `SQLite` stores for turns, conversations, users and sessions
//! - `context`: Response modes and prompt assembly
//! - `summarization`: Rolling summaries and their background queue
//! - `engine`: Chat orchestration for a single request

pub mod context;
pub mod core;
pub mod engine;
pub mod storage;
pub mod summarization;

pub use self::core::{
    AppConfig, ChatError, ChatResult, Conversation, ConversationId, Sender, Turn, UserId,
};
pub use context::{ContextAssembler, ResponseMode};
pub use engine::{ChatBackends, ChatCommand, ChatEngine, ChatReply, RequestContext};
pub use storage::Database;
pub use summarization::{SummaryPolicy, SummaryQueue, Summarizer};
