//! Summary refresh throttle.

use chrono::{DateTime, Duration, Utc};

use crate::chat::core::config::SummaryConfig;
use crate::chat::core::conversation::Conversation;

/// Decides when a rolling summary is stale.
#[derive(Clone, Copy, Debug)]
pub struct SummaryPolicy {
    max_age: Duration,
    min_new_messages: u64,
}

impl SummaryPolicy {
    /// Build a policy from configuration.
    #[must_use]
    pub fn new(config: &SummaryConfig) -> Self {
        let max_age = i64::try_from(config.max_age_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self {
            max_age,
            min_new_messages: config.min_new_messages,
        }
    }

    /// Whether the summary for `conversation` should be recomputed at `now`.
    ///
    /// Skips only when the summary is both younger than the max age and
    /// behind by fewer than the minimum number of new messages.
    #[must_use]
    pub fn should_refresh(&self, conversation: &Conversation, now: DateTime<Utc>) -> bool {
        let Some(updated_at) = conversation.summary_updated_at else {
            return true;
        };
        if conversation.summary_text().is_none() {
            return true;
        }

        let fresh = now.signed_duration_since(updated_at) < self.max_age;
        let new_messages = conversation
            .message_count
            .saturating_sub(conversation.summary_message_count);
        !(fresh && new_messages < self.min_new_messages)
    }
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self::new(&SummaryConfig::default())
    }
}
