//! Message store: append-only record of chat turns.

use std::str::FromStr;
use std::sync::Arc;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::chat::core::config::StorageConfig;
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::{ConversationId, UserId};
use crate::chat::core::turn::{NewTurn, Sender, Turn};
use crate::chat::storage::conversation_store::StoreFuture;
use crate::chat::storage::database::{count_from_sql, limit_to_sql, millis_to_utc};

/// Message store trait.
pub trait TurnStore: Send + Sync {
    /// Append turns to one owned conversation and bump its counters.
    ///
    /// All turns must target `conversation_id`/`user_id`. Nothing is written
    /// when the conversation is not owned by `user_id`.
    ///
    /// # Errors
    /// Returns [`ChatError::NotFound`] for a foreign or missing conversation,
    /// or an error if storage access fails.
    fn append(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        turns: Vec<NewTurn>,
    ) -> StoreFuture<'_, ChatResult<Vec<Turn>>>;

    /// Load the most recent turns, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn load_recent(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        limit: usize,
    ) -> StoreFuture<'_, ChatResult<Vec<Turn>>>;

    /// Load the most recent turns together with the conversation's message
    /// count as of the same read.
    ///
    /// Returns `None` when the conversation is not owned by `user_id`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn load_window(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        limit: usize,
    ) -> StoreFuture<'_, ChatResult<Option<TurnWindow>>>;

    /// Load every turn, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn load_all(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> StoreFuture<'_, ChatResult<Vec<Turn>>>;
}

/// Recent turns and the message count they were read against.
#[derive(Clone, Debug)]
pub struct TurnWindow {
    /// Most recent turns, oldest first.
    pub turns: Vec<Turn>,
    /// Stored turns in the conversation at read time.
    pub message_count: u64,
}

/// `SQLite` implementation of the message store.
pub struct SqliteTurnStore {
    conn: Arc<Connection>,
    table: String,
    conversation_table: String,
}

type TurnRow = (i64, ConversationId, UserId, String, String, i64);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TurnRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn select_recent(
    conn: &rusqlite::Connection,
    table: &str,
    conversation_id: ConversationId,
    user_id: UserId,
    limit: i64,
) -> rusqlite::Result<Vec<TurnRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, conversation_id, user_id, message, sender, ts
         FROM {table}
         WHERE conversation_id = ?1 AND user_id = ?2
         ORDER BY ts DESC, id DESC
         LIMIT ?3"
    ))?;
    let mut rows = stmt
        .query_map(rusqlite::params![conversation_id, user_id, limit], read_row)?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
    rows.reverse();
    Ok(rows)
}

fn decode_rows(rows: Vec<TurnRow>) -> ChatResult<Vec<Turn>> {
    let mut turns = Vec::with_capacity(rows.len());
    for (id, conversation_id, user_id, message, sender, ts) in rows {
        let sender = Sender::from_str(&sender)
            .map_err(|err| ChatError::CorruptRecord(format!("invalid sender: {err}")))?;
        turns.push(Turn {
            id,
            conversation_id,
            user_id,
            message,
            sender,
            timestamp: millis_to_utc(ts)?,
        });
    }
    Ok(turns)
}

impl SqliteTurnStore {
    /// Initialize the store and create the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>, config: &StorageConfig) -> ChatResult<Self> {
        let table = config.turn_table.clone();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    message TEXT NOT NULL,
                    sender TEXT NOT NULL,
                    ts INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_conversation_ts
                    ON {table_name} (conversation_id, ts, id);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            table,
            conversation_table: config.conversation_table.clone(),
        })
    }
}

impl TurnStore for SqliteTurnStore {
    fn append(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        turns: Vec<NewTurn>,
    ) -> StoreFuture<'_, ChatResult<Vec<Turn>>> {
        Box::pin(async move {
            if turns.is_empty() {
                return Ok(Vec::new());
            }
            if turns
                .iter()
                .any(|turn| turn.conversation_id != conversation_id || turn.user_id != user_id)
            {
                return Err(ChatError::Validation(
                    "turn does not belong to the target conversation".to_string(),
                ));
            }

            let table = self.table.clone();
            let conversation_table = self.conversation_table.clone();
            let added = i64::try_from(turns.len())
                .map_err(|_| ChatError::Validation("too many turns".to_string()))?;

            let written = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let owned = tx
                        .query_row(
                            &format!(
                                "SELECT 1 FROM {conversation_table}
                                 WHERE conversation_id = ?1 AND user_id = ?2"
                            ),
                            rusqlite::params![conversation_id, user_id],
                            |row| row.get::<_, i64>(0),
                        )
                        .optional()?
                        .is_some();
                    if !owned {
                        return Ok(None);
                    }

                    let mut written = Vec::with_capacity(turns.len());
                    let mut last_ts = 0_i64;
                    {
                        let mut stmt = tx.prepare(&format!(
                            "INSERT INTO {table} (conversation_id, user_id, message, sender, ts)
                             VALUES (?1, ?2, ?3, ?4, ?5)"
                        ))?;
                        for turn in turns {
                            let ts = turn.timestamp.timestamp_millis();
                            stmt.execute(rusqlite::params![
                                turn.conversation_id,
                                turn.user_id,
                                turn.message,
                                turn.sender.as_str(),
                                ts
                            ])?;
                            last_ts = last_ts.max(ts);
                            written.push((
                                tx.last_insert_rowid(),
                                turn.conversation_id,
                                turn.user_id,
                                turn.message,
                                turn.sender.as_str().to_string(),
                                ts,
                            ));
                        }
                    }

                    tx.execute(
                        &format!(
                            "UPDATE {conversation_table}
                             SET message_count = message_count + ?1,
                                 updated_at = MAX(updated_at, ?2)
                             WHERE conversation_id = ?3 AND user_id = ?4"
                        ),
                        rusqlite::params![added, last_ts, conversation_id, user_id],
                    )?;
                    tx.commit()?;
                    Ok(Some(written))
                })
                .await?;

            match written {
                Some(rows) => decode_rows(rows),
                None => Err(ChatError::NotFound),
            }
        })
    }

    fn load_recent(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        limit: usize,
    ) -> StoreFuture<'_, ChatResult<Vec<Turn>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let limit = limit_to_sql(limit)?;
            let rows = self
                .conn
                .call(move |conn| {
                    Ok(select_recent(conn, &table, conversation_id, user_id, limit)?)
                })
                .await?;

            decode_rows(rows)
        })
    }

    fn load_window(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        limit: usize,
    ) -> StoreFuture<'_, ChatResult<Option<TurnWindow>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let conversation_table = self.conversation_table.clone();
            let limit = limit_to_sql(limit)?;
            let read = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let count = tx
                        .query_row(
                            &format!(
                                "SELECT message_count FROM {conversation_table}
                                 WHERE conversation_id = ?1 AND user_id = ?2"
                            ),
                            rusqlite::params![conversation_id, user_id],
                            |row| row.get::<_, i64>(0),
                        )
                        .optional()?;
                    let Some(count) = count else {
                        return Ok(None);
                    };
                    let rows = select_recent(&tx, &table, conversation_id, user_id, limit)?;
                    tx.commit()?;
                    Ok(Some((rows, count)))
                })
                .await?;

            match read {
                Some((rows, count)) => Ok(Some(TurnWindow {
                    turns: decode_rows(rows)?,
                    message_count: count_from_sql(count)?,
                })),
                None => Ok(None),
            }
        })
    }

    fn load_all(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> StoreFuture<'_, ChatResult<Vec<Turn>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, conversation_id, user_id, message, sender, ts
                         FROM {table}
                         WHERE conversation_id = ?1 AND user_id = ?2
                         ORDER BY ts, id"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![conversation_id, user_id], read_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            decode_rows(rows)
        })
    }
}
