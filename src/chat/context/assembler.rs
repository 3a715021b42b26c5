//! Context assembly: system instruction, summary, recent history, new message.

use std::sync::Arc;

use tracing::debug;

use crate::chat::context::mode::{ModeSelector, ResponseMode};
use crate::chat::core::config::{ContextConfig, ModeConfig};
use crate::chat::core::conversation::Conversation;
use crate::chat::core::errors::ChatResult;
use crate::chat::core::turn::{Sender, Turn};
use crate::chat::storage::turn_store::TurnStore;
use crate::llm::completion::{CompletionRequest, PromptMessage};

/// Prompt parts before formatting.
#[derive(Clone, Debug, Default)]
pub struct PromptParts {
    /// Optional conversation summary.
    pub summary: Option<String>,
    /// Recent turns, oldest first.
    pub history: Vec<Turn>,
    /// Current user message.
    pub user_message: String,
}

/// Prompt ready for the completion backend.
#[derive(Clone, Debug)]
pub struct AssembledPrompt {
    /// Selected response mode.
    pub mode: ResponseMode,
    /// User text actually forwarded (directive removed).
    pub forwarded_message: String,
    /// Number of history turns included.
    pub history_turns: usize,
    /// Whether a summary line was included.
    pub has_summary: bool,
    /// Request for the completion backend.
    pub request: CompletionRequest,
}

/// Builds the bounded prompt for one chat turn.
pub struct ContextAssembler {
    turns: Arc<dyn TurnStore>,
    config: ContextConfig,
    modes: ModeSelector,
}

impl ContextAssembler {
    /// Create a new assembler.
    ///
    /// # Errors
    /// Returns an error if the mode configuration is invalid.
    pub fn new(
        turns: Arc<dyn TurnStore>,
        context: &ContextConfig,
        modes: &ModeConfig,
    ) -> ChatResult<Self> {
        Ok(Self {
            turns,
            config: context.clone(),
            modes: ModeSelector::new(modes)?,
        })
    }

    /// Mode selector shared with callers that need the mode up front.
    #[must_use]
    pub const fn modes(&self) -> &ModeSelector {
        &self.modes
    }

    /// Assemble the prompt for `message` in `conversation`.
    ///
    /// `None` means the user has no conversation yet: the prompt is the
    /// system instruction plus the new message.
    ///
    /// # Errors
    /// Returns an error if history cannot be loaded.
    pub async fn assemble(
        &self,
        conversation: Option<&Conversation>,
        message: &str,
    ) -> ChatResult<AssembledPrompt> {
        let selection = self.modes.select(message);

        let (summary, history) = match conversation {
            Some(conversation) => {
                let fetched = self
                    .turns
                    .load_recent(
                        conversation.conversation_id,
                        conversation.user_id,
                        self.config.history_fetch,
                    )
                    .await?;
                (
                    conversation.summary_text().map(str::to_string),
                    select_window(fetched, self.config.history_window),
                )
            }
            None => (None, Vec::new()),
        };

        let parts = PromptParts {
            summary,
            history,
            user_message: selection.message.clone(),
        };
        let params = self.modes.params(selection.mode);
        let messages = build_messages(&params.instruction, &parts);

        debug!(
            mode = selection.mode.command(),
            history = parts.history.len(),
            summary = parts.summary.is_some(),
            "Assembled chat context"
        );

        Ok(AssembledPrompt {
            mode: selection.mode,
            forwarded_message: selection.message,
            history_turns: parts.history.len(),
            has_summary: parts.summary.is_some(),
            request: CompletionRequest {
                messages,
                max_tokens: params.max_tokens,
                temperature: params.temperature,
            },
        })
    }
}

/// Keep the last `window` turns of a chronological list.
#[must_use]
pub fn select_window(mut turns: Vec<Turn>, window: usize) -> Vec<Turn> {
    if turns.len() > window {
        turns.drain(..turns.len() - window);
    }
    turns
}

/// Build a deterministic message list from prepared parts.
#[must_use]
pub fn build_messages(instruction: &str, parts: &PromptParts) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(parts.history.len() + 3);
    messages.push(PromptMessage::system(instruction));

    if let Some(summary) = parts.summary.as_deref() {
        messages.push(PromptMessage::system(format!(
            "Summary of the conversation so far: {summary}"
        )));
    }

    for turn in &parts.history {
        messages.push(match turn.sender {
            Sender::User => PromptMessage::user(turn.message.as_str()),
            Sender::Assistant => PromptMessage::assistant(turn.message.as_str()),
        });
    }

    messages.push(PromptMessage::user(parts.user_message.as_str()));
    messages
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::chat::core::config::StorageConfig;
    use crate::chat::core::turn::NewTurn;
    use crate::chat::storage::conversation_store::{ConversationStore, SqliteConversationStore};
    use crate::chat::storage::database::Database;
    use crate::chat::storage::turn_store::SqliteTurnStore;
    use crate::llm::completion::Role;
    use crate::chat::core::ids::UserId;

    struct Fixture {
        assembler: ContextAssembler,
        conversations: SqliteConversationStore,
        turns: Arc<SqliteTurnStore>,
    }

    async fn fixture() -> Fixture {
        let db = Database::open_in_memory().await.unwrap();
        let storage = StorageConfig::default();
        let conversations = SqliteConversationStore::new(db.connection(), &storage)
            .await
            .unwrap();
        let turns = Arc::new(SqliteTurnStore::new(db.connection(), &storage).await.unwrap());
        let assembler = ContextAssembler::new(
            turns.clone(),
            &ContextConfig::default(),
            &ModeConfig::default(),
        )
        .unwrap();
        Fixture {
            assembler,
            conversations,
            turns,
        }
    }

    async fn conversation_with_turns(fixture: &Fixture, count: usize) -> Conversation {
        let owner = UserId::new();
        let conversation = Conversation::new(owner, "long chat", Utc::now());
        let id = conversation.conversation_id;
        fixture
            .conversations
            .create(conversation.clone())
            .await
            .unwrap();
        let batch: Vec<NewTurn> = (0..count)
            .map(|i| {
                if i % 2 == 0 {
                    NewTurn::user(id, owner, format!("question {i}"))
                } else {
                    NewTurn::assistant(id, owner, format!("answer {i}"))
                }
            })
            .collect();
        fixture.turns.append(id, owner, batch).await.unwrap();
        fixture
            .conversations
            .get(id, owner)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn no_conversation_yields_instruction_and_message() {
        let fixture = fixture().await;
        let prompt = fixture.assembler.assemble(None, "hello").await.unwrap();

        assert_eq!(prompt.request.messages.len(), 2);
        assert_eq!(prompt.request.messages[0].role, Role::System);
        assert_eq!(prompt.request.messages[1], PromptMessage::user("hello"));
        assert!(!prompt.has_summary);
        assert_eq!(prompt.history_turns, 0);
    }

    #[tokio::test]
    async fn long_conversation_is_bounded() {
        let fixture = fixture().await;
        let mut conversation = conversation_with_turns(&fixture, 500).await;
        conversation.summary = Some("The user studies astronomy.".to_string());

        let prompt = fixture
            .assembler
            .assemble(Some(&conversation), "next question")
            .await
            .unwrap();

        // system instruction + summary + 10 history + new message
        assert_eq!(prompt.request.messages.len(), 13);
        assert_eq!(prompt.history_turns, 10);
        assert!(prompt.has_summary);

        let summary = &prompt.request.messages[1];
        assert_eq!(summary.role, Role::System);
        assert!(summary.content.contains("The user studies astronomy."));

        assert_eq!(prompt.request.messages[2].content, "question 490");
        assert_eq!(prompt.request.messages[11].content, "answer 499");
        assert_eq!(prompt.request.messages[11].role, Role::Assistant);
        assert_eq!(
            prompt.request.messages.last().unwrap(),
            &PromptMessage::user("next question")
        );
    }

    #[tokio::test]
    async fn elaborate_changes_budget_and_forwarded_text() {
        let fixture = fixture().await;
        let conversation = conversation_with_turns(&fixture, 2).await;

        let prompt = fixture
            .assembler
            .assemble(Some(&conversation), "elaborate on photosynthesis")
            .await
            .unwrap();

        assert_eq!(prompt.mode, ResponseMode::Elaborate);
        assert_eq!(prompt.forwarded_message, "on photosynthesis");
        assert_eq!(prompt.request.max_tokens, 800);
        assert_eq!(
            prompt.request.messages.last().unwrap().content,
            "on photosynthesis"
        );
        assert_eq!(
            prompt.request.messages[0].content,
            ModeConfig::default().elaborate.instruction
        );
    }

    #[test]
    fn window_keeps_the_tail() {
        let owner = UserId::new();
        let id = crate::chat::core::ids::ConversationId::new();
        let turns: Vec<Turn> = (0..5)
            .map(|i| Turn {
                id: i,
                conversation_id: id,
                user_id: owner,
                message: format!("m{i}"),
                sender: Sender::User,
                timestamp: Utc::now(),
            })
            .collect();

        let kept = select_window(turns, 2);
        let ids: Vec<i64> = kept.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn blank_summary_is_not_rendered() {
        let parts = PromptParts {
            summary: None,
            history: Vec::new(),
            user_message: "hi".to_string(),
        };
        let messages = build_messages("Be brief.", &parts);
        assert_eq!(messages.len(), 2);
    }
}
