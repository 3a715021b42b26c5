//! Account storage for login and signup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::chat::core::config::StorageConfig;
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::UserId;
use crate::chat::storage::conversation_store::StoreFuture;
use crate::chat::storage::database::millis_to_utc;

/// A registered account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    /// Account id.
    pub user_id: UserId,
    /// Login name, stored lowercase.
    pub username: String,
    /// Hex-encoded password digest.
    pub password_hash: String,
    /// Hex-encoded salt.
    pub salt: String,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// User account store trait.
pub trait UserStore: Send + Sync {
    /// Register an account.
    ///
    /// # Errors
    /// Returns [`ChatError::Conflict`] if the username is taken, or an error
    /// if storage access fails.
    fn create_user(&self, record: UserRecord) -> StoreFuture<'_, ChatResult<()>>;

    /// Look up an account by (case-insensitive) username.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn find_by_username(&self, username: &str) -> StoreFuture<'_, ChatResult<Option<UserRecord>>>;
}

/// `SQLite` implementation of the user store.
pub struct SqliteUserStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteUserStore {
    /// Initialize the user store.
    ///
    /// # Errors
    /// Returns an error if the table cannot be created.
    pub async fn new(conn: Arc<Connection>, config: &StorageConfig) -> ChatResult<Self> {
        let table = config.user_table.clone();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    user_id TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    salt TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

/// Canonical form of a login name.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, record: UserRecord) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let username = normalize_username(&record.username);
            let inserted = self
                .conn
                .call(move |conn| {
                    let inserted = conn.execute(
                        &format!(
                            "INSERT OR IGNORE INTO {table}
                             (user_id, username, password_hash, salt, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5)"
                        ),
                        rusqlite::params![
                            record.user_id,
                            username,
                            record.password_hash,
                            record.salt,
                            record.created_at.timestamp_millis()
                        ],
                    )?;
                    Ok(inserted)
                })
                .await?;

            if inserted == 0 {
                return Err(ChatError::Conflict);
            }
            Ok(())
        })
    }

    fn find_by_username(&self, username: &str) -> StoreFuture<'_, ChatResult<Option<UserRecord>>> {
        let username = normalize_username(username);
        Box::pin(async move {
            let table = self.table.clone();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT user_id, username, password_hash, salt, created_at
                                 FROM {table} WHERE username = ?1"
                            ),
                            rusqlite::params![username],
                            |row| {
                                Ok((
                                    row.get::<_, UserId>(0)?,
                                    row.get::<_, String>(1)?,
                                    row.get::<_, String>(2)?,
                                    row.get::<_, String>(3)?,
                                    row.get::<_, i64>(4)?,
                                ))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            match row {
                Some((user_id, username, password_hash, salt, created_at)) => Ok(Some(UserRecord {
                    user_id,
                    username,
                    password_hash,
                    salt,
                    created_at: millis_to_utc(created_at)?,
                })),
                None => Ok(None),
            }
        })
    }
}
