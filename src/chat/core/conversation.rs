//! Conversation record and helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::core::ids::{ConversationId, UserId};

/// Title given to conversations before their first user message.
pub const PLACEHOLDER_TITLE: &str = "New Conversation";

/// Maximum characters kept when deriving a title from a message.
pub const TITLE_MAX_CHARS: usize = 50;

/// A titled thread of turns owned by one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier.
    pub conversation_id: ConversationId,
    /// Owning user.
    pub user_id: UserId,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
    /// Rolling summary, if one has been produced.
    pub summary: Option<String>,
    /// When the summary was last written.
    pub summary_updated_at: Option<DateTime<Utc>>,
    /// `message_count` at the time the summary was written.
    pub summary_message_count: u64,
    /// Number of stored turns.
    pub message_count: u64,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new(user_id: UserId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id: ConversationId::new(),
            user_id,
            title: title.into(),
            created_at: now,
            updated_at: now,
            summary: None,
            summary_updated_at: None,
            summary_message_count: 0,
            message_count: 0,
        }
    }

    /// Non-empty summary text, if any.
    #[must_use]
    pub fn summary_text(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Whether the title is still the placeholder.
    #[must_use]
    pub fn has_placeholder_title(&self) -> bool {
        self.title.is_empty() || self.title == PLACEHOLDER_TITLE
    }
}

/// Derive a conversation title from the first user message.
#[must_use]
pub fn title_from_message(message: &str) -> String {
    let flattened = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.is_empty() {
        return PLACEHOLDER_TITLE.to_string();
    }

    if flattened.chars().count() <= TITLE_MAX_CHARS {
        flattened
    } else {
        let mut title: String = flattened.chars().take(TITLE_MAX_CHARS).collect();
        title = title.trim_end().to_string();
        title.push_str("...");
        title
    }
}

/// Format a timestamp as ISO-8601 UTC with a trailing `Z`.
#[must_use]
pub fn iso_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn iso_timestamps_end_with_z() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(iso_utc(ts), "2024-03-09T14:05:07.000Z");
    }

    #[test]
    fn short_messages_become_the_title() {
        assert_eq!(title_from_message("  what is   the weather "), "what is the weather");
    }

    #[test]
    fn long_messages_are_truncated() {
        let title = title_from_message(&"word ".repeat(40));
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn blank_summary_counts_as_absent() {
        let mut conversation = Conversation::new(UserId::new(), PLACEHOLDER_TITLE, Utc::now());
        conversation.summary = Some("   ".to_string());
        assert!(conversation.summary_text().is_none());
        assert!(conversation.has_placeholder_title());
    }
}
