//! Persistent storage for turns, conversations, accounts and sessions.

pub mod conversation_store;
pub mod database;
pub mod session_store;
pub mod turn_store;
pub mod user_store;

pub use conversation_store::{
    ConversationStore, SqliteConversationStore, StoreFuture, SummaryUpdate,
};
pub use database::Database;
pub use session_store::{SessionRecord, SessionStore, SqliteSessionStore};
pub use turn_store::{SqliteTurnStore, TurnStore, TurnWindow};
pub use user_store::{SqliteUserStore, UserRecord, UserStore, normalize_username};
