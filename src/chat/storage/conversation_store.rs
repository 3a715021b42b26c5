//! Conversation registry: one row per conversation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::chat::core::config::StorageConfig;
use crate::chat::core::conversation::{Conversation, PLACEHOLDER_TITLE};
use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::{ConversationId, UserId};
use crate::chat::storage::database::{count_from_sql, count_to_sql, limit_to_sql, millis_to_utc};

/// Boxed future type for conversation store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Summary fields written by the summarizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryUpdate {
    /// Summary text.
    pub summary: String,
    /// Write time.
    pub updated_at: DateTime<Utc>,
    /// `message_count` the summary covers.
    pub message_count: u64,
}

/// Conversation registry trait.
///
/// Every lookup is scoped by both conversation and owner; a conversation
/// owned by someone else is indistinguishable from a missing one.
pub trait ConversationStore: Send + Sync {
    /// Insert a new conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create(&self, conversation: Conversation) -> StoreFuture<'_, ChatResult<()>>;

    /// Fetch a conversation owned by `user_id`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>>;

    /// The user's most recently created conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn most_recent(&self, user_id: UserId) -> StoreFuture<'_, ChatResult<Option<Conversation>>>;

    /// The user's conversations, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_recent(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> StoreFuture<'_, ChatResult<Vec<Conversation>>>;

    /// Overwrite the summary fields. Returns `false` if no owned row matched.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn update_summary(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        update: SummaryUpdate,
    ) -> StoreFuture<'_, ChatResult<bool>>;

    /// Replace the title only while it is still the placeholder.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn set_title_if_placeholder(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        title: String,
    ) -> StoreFuture<'_, ChatResult<()>>;
}

/// `SQLite` implementation of the conversation registry.
pub struct SqliteConversationStore {
    conn: Arc<Connection>,
    table: String,
}

const COLUMNS: &str = "conversation_id, user_id, title, created_at, updated_at, summary, \
                       summary_updated_at, summary_message_count, message_count";

type ConversationRow = (
    ConversationId,
    UserId,
    String,
    i64,
    i64,
    Option<String>,
    Option<i64>,
    i64,
    i64,
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode_row(row: ConversationRow) -> ChatResult<Conversation> {
    let (
        conversation_id,
        user_id,
        title,
        created_at,
        updated_at,
        summary,
        summary_updated_at,
        summary_message_count,
        message_count,
    ) = row;

    Ok(Conversation {
        conversation_id,
        user_id,
        title,
        created_at: millis_to_utc(created_at)?,
        updated_at: millis_to_utc(updated_at)?,
        summary,
        summary_updated_at: summary_updated_at.map(millis_to_utc).transpose()?,
        summary_message_count: count_from_sql(summary_message_count)?,
        message_count: count_from_sql(message_count)?,
    })
}

impl SqliteConversationStore {
    /// Initialize the store and create the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>, config: &StorageConfig) -> ChatResult<Self> {
        let table = config.conversation_table.clone();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    conversation_id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    title TEXT NOT NULL DEFAULT '',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    summary TEXT,
                    summary_updated_at INTEGER,
                    summary_message_count INTEGER NOT NULL DEFAULT 0,
                    message_count INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_user_created
                    ON {table_name} (user_id, created_at DESC);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }

    async fn query_many(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> ChatResult<Vec<Conversation>> {
        let table = self.table.clone();
        let limit = limit_to_sql(limit)?;
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM {table}
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![user_id, limit], read_row)?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(decode_row).collect()
    }
}

impl ConversationStore for SqliteConversationStore {
    fn create(&self, conversation: Conversation) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let summary_message_count = count_to_sql(conversation.summary_message_count)?;
            let message_count = count_to_sql(conversation.message_count)?;

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} ({COLUMNS})
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                        ),
                        rusqlite::params![
                            conversation.conversation_id,
                            conversation.user_id,
                            conversation.title,
                            conversation.created_at.timestamp_millis(),
                            conversation.updated_at.timestamp_millis(),
                            conversation.summary,
                            conversation.summary_updated_at.map(|ts| ts.timestamp_millis()),
                            summary_message_count,
                            message_count,
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn get(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT {COLUMNS} FROM {table}
                                 WHERE conversation_id = ?1 AND user_id = ?2"
                            ),
                            rusqlite::params![conversation_id, user_id],
                            read_row,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.map(decode_row).transpose()
        })
    }

    fn most_recent(&self, user_id: UserId) -> StoreFuture<'_, ChatResult<Option<Conversation>>> {
        Box::pin(async move { Ok(self.query_many(user_id, 1).await?.into_iter().next()) })
    }

    fn list_recent(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> StoreFuture<'_, ChatResult<Vec<Conversation>>> {
        Box::pin(self.query_many(user_id, limit))
    }

    fn update_summary(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        update: SummaryUpdate,
    ) -> StoreFuture<'_, ChatResult<bool>> {
        Box::pin(async move {
            let table = self.table.clone();
            let snapshot = count_to_sql(update.message_count)?;
            let updated_at = update.updated_at.timestamp_millis();
            let summary = update.summary;

            let changed = self
                .conn
                .call(move |conn| {
                    let changed = conn.execute(
                        &format!(
                            "UPDATE {table}
                             SET summary = ?1, summary_updated_at = ?2, summary_message_count = ?3
                             WHERE conversation_id = ?4 AND user_id = ?5"
                        ),
                        rusqlite::params![summary, updated_at, snapshot, conversation_id, user_id],
                    )?;
                    Ok(changed)
                })
                .await?;
            Ok(changed > 0)
        })
    }

    fn set_title_if_placeholder(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        title: String,
    ) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "UPDATE {table} SET title = ?1
                             WHERE conversation_id = ?2 AND user_id = ?3
                               AND (title = '' OR title = ?4)"
                        ),
                        rusqlite::params![title, conversation_id, user_id, PLACEHOLDER_TITLE],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::chat::storage::database::Database;

    async fn store() -> SqliteConversationStore {
        let db = Database::open_in_memory().await.unwrap();
        SqliteConversationStore::new(db.connection(), &StorageConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn get_is_scoped_by_owner() {
        let store = store().await;
        let owner = UserId::new();
        let conversation = Conversation::new(owner, "Groceries", Utc::now());
        let id = conversation.conversation_id;
        store.create(conversation.clone()).await.unwrap();

        let fetched = store.get(id, owner).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Groceries");
        assert_eq!(fetched.user_id, owner);
        assert!(store.get(id, UserId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let store = store().await;
        let owner = UserId::new();
        let base = Utc::now();
        for i in 0..5 {
            let conversation =
                Conversation::new(owner, format!("c{i}"), base + Duration::seconds(i));
            store.create(conversation).await.unwrap();
        }
        store
            .create(Conversation::new(UserId::new(), "other", base))
            .await
            .unwrap();

        let listed = store.list_recent(owner, 3).await.unwrap();
        let titles: Vec<_> = listed.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["c4", "c3", "c2"]);

        let recent = store.most_recent(owner).await.unwrap().unwrap();
        assert_eq!(recent.title, "c4");
    }

    #[tokio::test]
    async fn summary_update_requires_owner() {
        let store = store().await;
        let owner = UserId::new();
        let conversation = Conversation::new(owner, PLACEHOLDER_TITLE, Utc::now());
        let id = conversation.conversation_id;
        store.create(conversation).await.unwrap();

        let update = SummaryUpdate {
            summary: "User is planning a trip to Lisbon.".to_string(),
            updated_at: Utc::now(),
            message_count: 12,
        };
        assert!(!store
            .update_summary(id, UserId::new(), update.clone())
            .await
            .unwrap());
        assert!(store.update_summary(id, owner, update).await.unwrap());

        let fetched = store.get(id, owner).await.unwrap().unwrap();
        assert_eq!(
            fetched.summary.as_deref(),
            Some("User is planning a trip to Lisbon.")
        );
        assert_eq!(fetched.summary_message_count, 12);
        assert!(fetched.summary_updated_at.is_some());
    }

    #[tokio::test]
    async fn title_only_replaces_placeholder() {
        let store = store().await;
        let owner = UserId::new();
        let conversation = Conversation::new(owner, PLACEHOLDER_TITLE, Utc::now());
        let id = conversation.conversation_id;
        store.create(conversation).await.unwrap();

        store
            .set_title_if_placeholder(id, owner, "first".to_string())
            .await
            .unwrap();
        store
            .set_title_if_placeholder(id, owner, "second".to_string())
            .await
            .unwrap();

        assert_eq!(store.get(id, owner).await.unwrap().unwrap().title, "first");
    }
}
