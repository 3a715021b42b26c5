//! Chat engine orchestration.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::chat::context::assembler::ContextAssembler;
use crate::chat::context::mode::ResponseMode;
use crate::chat::core::config::AppConfig;
use crate::chat::core::conversation::{Conversation, PLACEHOLDER_TITLE, title_from_message};
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::{ConversationId, UserId};
use crate::chat::core::turn::{NewTurn, Sender, Turn};
use crate::chat::engine::commands::{ChatCommand, HELP_REPLY, STOP_REPLY, voice_command};
use crate::chat::storage::conversation_store::{ConversationStore, SqliteConversationStore};
use crate::chat::storage::database::Database;
use crate::chat::storage::session_store::{SessionStore, SqliteSessionStore};
use crate::chat::storage::turn_store::{SqliteTurnStore, TurnStore};
use crate::chat::storage::user_store::{SqliteUserStore, UserStore};
use crate::chat::summarization::policy::SummaryPolicy;
use crate::chat::summarization::queue::{SummaryJob, SummaryQueue};
use crate::llm::completion::CompletionBackend;
use crate::llm::groq::GroqClient;

/// Maximum conversations returned by the history listing.
pub const HISTORY_LIMIT: usize = 50;

/// Caller identity and active-conversation binding for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Authenticated user.
    pub user_id: UserId,
    /// Session token the binding is persisted under, if any.
    pub session_token: Option<String>,
    /// Conversation currently bound to the session.
    pub conversation_id: Option<ConversationId>,
}

impl RequestContext {
    /// Context with no persisted session.
    #[must_use]
    pub const fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            session_token: None,
            conversation_id: None,
        }
    }
}

/// Conversation a reply was written to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationRef {
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Whether this request created it.
    pub created: bool,
    /// Current title.
    pub title: String,
}

/// Result of one chat turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatReply {
    /// Text shown and spoken to the user.
    pub response: String,
    /// Mode or command the reply corresponds to.
    pub command: ChatCommand,
    /// Whether both turns were stored.
    pub persisted: bool,
    /// Conversation the turns belong to.
    pub conversation: Option<ConversationRef>,
}

/// A single stored turn and where it went.
#[derive(Clone, Debug)]
pub struct SavedTurn {
    /// Conversation the turn was appended to.
    pub conversation: ConversationRef,
    /// Stored turn.
    pub turn: Turn,
}

/// Storage and model dependencies of the chat engine.
pub struct ChatBackends {
    /// Conversation registry.
    pub conversations: Arc<dyn ConversationStore>,
    /// Message store.
    pub turns: Arc<dyn TurnStore>,
    /// Session bindings.
    pub sessions: Arc<dyn SessionStore>,
    /// Accounts.
    pub users: Arc<dyn UserStore>,
    /// Completion backend.
    pub completion: Arc<dyn CompletionBackend>,
}

impl ChatBackends {
    /// Build `SQLite` stores on `db` and the Groq client.
    ///
    /// # Errors
    /// Returns an error if a table cannot be created or the client cannot be
    /// built.
    pub async fn sqlite(db: &Database, config: &AppConfig) -> ChatResult<Self> {
        let completion = Arc::new(GroqClient::new(&config.llm)?);
        Self::with_completion(db, config, completion).await
    }

    /// Build `SQLite` stores on `db` around an existing completion backend.
    ///
    /// # Errors
    /// Returns an error if a table cannot be created.
    pub async fn with_completion(
        db: &Database,
        config: &AppConfig,
        completion: Arc<dyn CompletionBackend>,
    ) -> ChatResult<Self> {
        let conversations =
            Arc::new(SqliteConversationStore::new(db.connection(), &config.storage).await?);
        let turns = Arc::new(SqliteTurnStore::new(db.connection(), &config.storage).await?);
        let sessions = Arc::new(SqliteSessionStore::new(db.connection(), &config.storage).await?);
        let users = Arc::new(SqliteUserStore::new(db.connection(), &config.storage).await?);

        Ok(Self {
            conversations,
            turns,
            sessions,
            users,
            completion,
        })
    }
}

/// Orchestrates context assembly, completion, persistence and summaries.
pub struct ChatEngine {
    conversations: Arc<dyn ConversationStore>,
    turns: Arc<dyn TurnStore>,
    sessions: Arc<dyn SessionStore>,
    completion: Arc<dyn CompletionBackend>,
    assembler: ContextAssembler,
    policy: SummaryPolicy,
    summaries: Option<SummaryQueue>,
}

impl ChatEngine {
    /// Create a new engine.
    ///
    /// Without a summary queue no summaries are scheduled.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: &AppConfig,
        backends: &ChatBackends,
        summaries: Option<SummaryQueue>,
    ) -> ChatResult<Self> {
        config.validate()?;
        let assembler =
            ContextAssembler::new(Arc::clone(&backends.turns), &config.context, &config.modes)?;

        Ok(Self {
            conversations: Arc::clone(&backends.conversations),
            turns: Arc::clone(&backends.turns),
            sessions: Arc::clone(&backends.sessions),
            completion: Arc::clone(&backends.completion),
            assembler,
            policy: SummaryPolicy::new(&config.summary),
            summaries,
        })
    }

    /// Whether the completion backend has credentials.
    #[must_use]
    pub fn completion_configured(&self) -> bool {
        self.completion.is_configured()
    }

    /// Handle one user chat message.
    ///
    /// Storage failures after the reply is generated are logged and reported
    /// through `persisted: false`.
    ///
    /// # Errors
    /// Returns [`ChatError::Validation`] for an empty message,
    /// [`ChatError::NotConfigured`] without credentials, or
    /// [`ChatError::Upstream`] when the completion call fails.
    pub async fn handle_chat(&self, ctx: &RequestContext, message: &str) -> ChatResult<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::Validation("No message provided".to_string()));
        }

        if let Some(command) = voice_command(message) {
            let response = match command {
                ChatCommand::Help => HELP_REPLY,
                _ => STOP_REPLY,
            };
            return Ok(ChatReply {
                response: response.to_string(),
                command,
                persisted: false,
                conversation: None,
            });
        }

        if !self.completion.is_configured() {
            return Err(ChatError::NotConfigured);
        }

        let (conversation, storage_ok) = match self.resolve_conversation(ctx).await {
            Ok(conversation) => (conversation, true),
            Err(err) if err.is_storage() => {
                warn!(user_id = %ctx.user_id, %err, "Conversation lookup failed, answering without history");
                (None, false)
            }
            Err(err) => return Err(err),
        };

        let prompt = match self.assembler.assemble(conversation.as_ref(), message).await {
            Ok(prompt) => prompt,
            Err(err) if err.is_storage() => {
                warn!(user_id = %ctx.user_id, %err, "History load failed, answering without history");
                self.assembler.assemble(None, message).await?
            }
            Err(err) => return Err(err),
        };
        let command = match prompt.mode {
            ResponseMode::Terse => ChatCommand::Normal,
            ResponseMode::Elaborate => ChatCommand::Elaborate,
        };

        let response = self.completion.complete(prompt.request).await?;
        debug!(user_id = %ctx.user_id, mode = command.as_str(), "Completion received");

        if !storage_ok {
            return Ok(ChatReply {
                response,
                command,
                persisted: false,
                conversation: None,
            });
        }

        match self
            .persist_exchange(ctx, conversation, message, &response)
            .await
        {
            Ok((stored, created)) => {
                self.schedule_summary(&stored);
                Ok(ChatReply {
                    response,
                    command,
                    persisted: true,
                    conversation: Some(ConversationRef {
                        conversation_id: stored.conversation_id,
                        created,
                        title: stored.title,
                    }),
                })
            }
            Err(err) => {
                warn!(user_id = %ctx.user_id, %err, "Failed to persist chat turns");
                Ok(ChatReply {
                    response,
                    command,
                    persisted: false,
                    conversation: None,
                })
            }
        }
    }

    /// Resolve the conversation new turns go to.
    ///
    /// Uses the session binding while it is still visible to the user,
    /// otherwise the user's most recently created conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn resolve_conversation(
        &self,
        ctx: &RequestContext,
    ) -> ChatResult<Option<Conversation>> {
        if let Some(bound) = ctx.conversation_id {
            if let Some(conversation) = self.conversations.get(bound, ctx.user_id).await? {
                return Ok(Some(conversation));
            }
            debug!(conversation_id = %bound, "Bound conversation no longer visible");
        }
        self.conversations.most_recent(ctx.user_id).await
    }

    /// Create an empty conversation and bind it to the session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn new_conversation(
        &self,
        ctx: &RequestContext,
        title: Option<&str>,
    ) -> ChatResult<Conversation> {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map_or_else(|| PLACEHOLDER_TITLE.to_string(), title_from_message);
        let conversation = Conversation::new(ctx.user_id, title, Utc::now());
        self.conversations.create(conversation.clone()).await?;
        self.bind(ctx, conversation.conversation_id).await?;

        info!(
            user_id = %ctx.user_id,
            conversation_id = %conversation.conversation_id,
            "Conversation created"
        );
        Ok(conversation)
    }

    /// Bind an owned conversation to the session.
    ///
    /// # Errors
    /// Returns [`ChatError::NotFound`] if the user does not own the
    /// conversation, or an error if storage access fails.
    pub async fn set_current_conversation(
        &self,
        ctx: &RequestContext,
        conversation_id: ConversationId,
    ) -> ChatResult<Conversation> {
        let conversation = self
            .conversations
            .get(conversation_id, ctx.user_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        self.bind(ctx, conversation_id).await?;
        Ok(conversation)
    }

    /// Append one turn to an explicit or the active conversation.
    ///
    /// A conversation is created when the user has none.
    ///
    /// # Errors
    /// Returns [`ChatError::Validation`] for an empty message,
    /// [`ChatError::NotFound`] for a conversation the user does not own, or an
    /// error if storage access fails.
    pub async fn save_turn(
        &self,
        ctx: &RequestContext,
        message: &str,
        sender: Sender,
        conversation_id: Option<ConversationId>,
    ) -> ChatResult<SavedTurn> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::Validation("No message provided".to_string()));
        }

        let existing = match conversation_id {
            Some(id) => Some(
                self.conversations
                    .get(id, ctx.user_id)
                    .await?
                    .ok_or(ChatError::NotFound)?,
            ),
            None => self.resolve_conversation(ctx).await?,
        };
        let (conversation, created) = self.ensure_conversation(ctx, existing, message).await?;
        let id = conversation.conversation_id;

        let mut stored = self
            .turns
            .append(id, ctx.user_id, vec![NewTurn::new(id, ctx.user_id, sender, message)])
            .await?;
        let title = self
            .retitle(&conversation, created, sender == Sender::User, message)
            .await?;
        let turn = stored.pop().ok_or_else(|| {
            ChatError::CorruptRecord("append returned no rows".to_string())
        })?;

        Ok(SavedTurn {
            conversation: ConversationRef {
                conversation_id: id,
                created,
                title,
            },
            turn,
        })
    }

    /// The user's most recent conversations, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn history(&self, user_id: UserId) -> ChatResult<Vec<Conversation>> {
        self.conversations.list_recent(user_id, HISTORY_LIMIT).await
    }

    /// A conversation with all of its turns.
    ///
    /// # Errors
    /// Returns [`ChatError::NotFound`] if the user does not own the
    /// conversation, or an error if storage access fails.
    pub async fn conversation_with_turns(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<(Conversation, Vec<Turn>)> {
        let conversation = self
            .conversations
            .get(conversation_id, user_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        let turns = self.turns.load_all(conversation_id, user_id).await?;
        Ok((conversation, turns))
    }

    async fn persist_exchange(
        &self,
        ctx: &RequestContext,
        conversation: Option<Conversation>,
        message: &str,
        response: &str,
    ) -> ChatResult<(Conversation, bool)> {
        let (mut conversation, created) =
            self.ensure_conversation(ctx, conversation, message).await?;
        let id = conversation.conversation_id;

        let stored = self
            .turns
            .append(
                id,
                ctx.user_id,
                vec![
                    NewTurn::user(id, ctx.user_id, message),
                    NewTurn::assistant(id, ctx.user_id, response),
                ],
            )
            .await?;
        conversation.title = self.retitle(&conversation, created, true, message).await?;
        conversation.message_count += stored.len() as u64;
        conversation.updated_at = Utc::now();

        if ctx.conversation_id != Some(id) {
            self.bind(ctx, id).await?;
        }
        Ok((conversation, created))
    }

    async fn ensure_conversation(
        &self,
        ctx: &RequestContext,
        existing: Option<Conversation>,
        message: &str,
    ) -> ChatResult<(Conversation, bool)> {
        if let Some(conversation) = existing {
            return Ok((conversation, false));
        }
        let conversation = Conversation::new(ctx.user_id, title_from_message(message), Utc::now());
        self.conversations.create(conversation.clone()).await?;
        self.bind(ctx, conversation.conversation_id).await?;
        info!(
            user_id = %ctx.user_id,
            conversation_id = %conversation.conversation_id,
            "Conversation created for first message"
        );
        Ok((conversation, true))
    }

    async fn retitle(
        &self,
        conversation: &Conversation,
        created: bool,
        from_user: bool,
        message: &str,
    ) -> ChatResult<String> {
        if created || !from_user || !conversation.has_placeholder_title() {
            return Ok(conversation.title.clone());
        }
        let title = title_from_message(message);
        self.conversations
            .set_title_if_placeholder(conversation.conversation_id, conversation.user_id, title.clone())
            .await?;
        Ok(title)
    }

    async fn bind(&self, ctx: &RequestContext, conversation_id: ConversationId) -> ChatResult<()> {
        match ctx.session_token.as_deref() {
            Some(token) => self.sessions.bind(token, Some(conversation_id)).await,
            None => Ok(()),
        }
    }

    fn schedule_summary(&self, conversation: &Conversation) {
        let Some(queue) = &self.summaries else {
            return;
        };
        if self.policy.should_refresh(conversation, Utc::now()) {
            queue.enqueue(SummaryJob {
                conversation_id: conversation.conversation_id,
                user_id: conversation.user_id,
            });
        }
    }
}
