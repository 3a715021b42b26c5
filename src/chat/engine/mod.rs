//! Chat orchestration: commands, context, completion and persistence.

pub mod commands;
pub mod core;

pub use commands::{ChatCommand, HELP_REPLY, STOP_REPLY, voice_command};
pub use self::core::{
    ChatBackends, ChatEngine, ChatReply, ConversationRef, HISTORY_LIMIT, RequestContext, SavedTurn,
};
