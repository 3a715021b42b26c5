//! Rolling conversation summaries produced by the completion backend.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::chat::core::config::SummaryConfig;
use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::{ConversationId, UserId};
use crate::chat::core::turn::Turn;
use crate::chat::storage::conversation_store::{ConversationStore, SummaryUpdate};
use crate::chat::storage::turn_store::TurnStore;
use crate::chat::summarization::policy::SummaryPolicy;
use crate::llm::completion::{CompletionBackend, CompletionRequest, PromptMessage};

/// What a refresh attempt did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// A new summary was written.
    Updated,
    /// The current summary is still fresh, or there is nothing to summarize.
    Skipped,
    /// The conversation no longer exists for this owner.
    Missing,
}

/// Produces and stores rolling summaries.
pub struct Summarizer {
    backend: Arc<dyn CompletionBackend>,
    turns: Arc<dyn TurnStore>,
    conversations: Arc<dyn ConversationStore>,
    policy: SummaryPolicy,
    config: SummaryConfig,
}

impl Summarizer {
    /// Create a new summarizer.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        turns: Arc<dyn TurnStore>,
        conversations: Arc<dyn ConversationStore>,
        config: &SummaryConfig,
    ) -> Self {
        Self {
            backend,
            turns,
            conversations,
            policy: SummaryPolicy::new(config),
            config: config.clone(),
        }
    }

    /// Throttle policy used by this summarizer.
    #[must_use]
    pub const fn policy(&self) -> &SummaryPolicy {
        &self.policy
    }

    /// Recompute the summary for one conversation if the policy allows it.
    ///
    /// # Errors
    /// Returns an error if storage access or the completion call fails.
    pub async fn refresh(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> ChatResult<SummaryOutcome> {
        let Some(conversation) = self.conversations.get(conversation_id, user_id).await? else {
            return Ok(SummaryOutcome::Missing);
        };
        if !self.policy.should_refresh(&conversation, Utc::now()) {
            return Ok(SummaryOutcome::Skipped);
        }
        if !self.backend.is_configured() {
            return Ok(SummaryOutcome::Skipped);
        }

        let Some(window) = self
            .turns
            .load_window(conversation_id, user_id, self.config.window)
            .await?
        else {
            return Ok(SummaryOutcome::Missing);
        };
        if window.turns.is_empty() {
            return Ok(SummaryOutcome::Skipped);
        }

        debug!(%conversation_id, turns = window.turns.len(), "Summarizing conversation");
        let summary = self.backend.complete(self.request(&window.turns)).await?;

        let updated = self
            .conversations
            .update_summary(
                conversation_id,
                user_id,
                SummaryUpdate {
                    summary,
                    updated_at: Utc::now(),
                    message_count: window.message_count,
                },
            )
            .await?;

        Ok(if updated {
            SummaryOutcome::Updated
        } else {
            SummaryOutcome::Missing
        })
    }

    fn request(&self, turns: &[Turn]) -> CompletionRequest {
        let instruction = format!(
            "You summarize conversations between a user and an assistant. Write a factual \
             summary in under {} words that captures the user's goals, decisions made, \
             stated preferences, unresolved questions and key entities (names, places, \
             numbers). Do not invent details and do not address the user.",
            self.config.max_words
        );
        let transcript = render_transcript(turns);

        CompletionRequest {
            messages: vec![
                PromptMessage::system(instruction),
                PromptMessage::user(format!("Summarize this conversation:\n\n{transcript}")),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

/// Render turns as `User: …` / `Assistant: …` lines.
#[must_use]
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.sender.label(), turn.message.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
