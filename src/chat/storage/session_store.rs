//! Session tokens and their active-conversation binding.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::chat::core::config::StorageConfig;
use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::{ConversationId, UserId};
use crate::chat::storage::conversation_store::StoreFuture;
use crate::chat::storage::database::millis_to_utc;

/// A logged-in session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    /// Opaque bearer token.
    pub token: String,
    /// Authenticated user.
    pub user_id: UserId,
    /// Conversation new turns append to.
    pub conversation_id: Option<ConversationId>,
    /// Login time.
    pub created_at: DateTime<Utc>,
}

/// Session store trait.
pub trait SessionStore: Send + Sync {
    /// Persist a new session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create(&self, session: SessionRecord) -> StoreFuture<'_, ChatResult<()>>;

    /// Resolve a token.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, token: &str) -> StoreFuture<'_, ChatResult<Option<SessionRecord>>>;

    /// Point the session at a conversation (or clear the binding).
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn bind(
        &self,
        token: &str,
        conversation_id: Option<ConversationId>,
    ) -> StoreFuture<'_, ChatResult<()>>;

    /// Remove the session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn delete(&self, token: &str) -> StoreFuture<'_, ChatResult<()>>;
}

/// `SQLite` implementation of the session store.
pub struct SqliteSessionStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteSessionStore {
    /// Initialize the session store.
    ///
    /// # Errors
    /// Returns an error if the table cannot be created.
    pub async fn new(conn: Arc<Connection>, config: &StorageConfig) -> ChatResult<Self> {
        let table = config.session_table.clone();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    token TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    conversation_id TEXT,
                    created_at INTEGER NOT NULL
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl SessionStore for SqliteSessionStore {
    fn create(&self, session: SessionRecord) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT OR REPLACE INTO {table} (token, user_id, conversation_id, created_at)
                             VALUES (?1, ?2, ?3, ?4)"
                        ),
                        rusqlite::params![
                            session.token,
                            session.user_id,
                            session.conversation_id,
                            session.created_at.timestamp_millis()
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn get(&self, token: &str) -> StoreFuture<'_, ChatResult<Option<SessionRecord>>> {
        let token = token.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT token, user_id, conversation_id, created_at
                                 FROM {table} WHERE token = ?1"
                            ),
                            rusqlite::params![token],
                            |row| {
                                Ok((
                                    row.get::<_, String>(0)?,
                                    row.get::<_, UserId>(1)?,
                                    row.get::<_, Option<ConversationId>>(2)?,
                                    row.get::<_, i64>(3)?,
                                ))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            match row {
                Some((token, user_id, conversation_id, created_at)) => Ok(Some(SessionRecord {
                    token,
                    user_id,
                    conversation_id,
                    created_at: millis_to_utc(created_at)?,
                })),
                None => Ok(None),
            }
        })
    }

    fn bind(
        &self,
        token: &str,
        conversation_id: Option<ConversationId>,
    ) -> StoreFuture<'_, ChatResult<()>> {
        let token = token.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("UPDATE {table} SET conversation_id = ?1 WHERE token = ?2"),
                        rusqlite::params![conversation_id, token],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn delete(&self, token: &str) -> StoreFuture<'_, ChatResult<()>> {
        let token = token.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE token = ?1"),
                        rusqlite::params![token],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}
