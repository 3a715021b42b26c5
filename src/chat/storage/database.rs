//! Shared `SQLite` connection handle.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio_rusqlite::Connection;

use crate::chat::core::config::StorageConfig;
use crate::chat::core::errors::{ChatError, ChatResult};

/// One background `SQLite` connection shared by every store.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    /// Open (or create) the configured database file.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(config: &StorageConfig) -> ChatResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await?;
        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if `SQLite` cannot allocate the database.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Shared connection for store construction.
    #[must_use]
    pub fn connection(&self) -> Arc<Connection> {
        Arc::clone(&self.conn)
    }

    /// Round-trip a trivial query.
    ///
    /// # Errors
    /// Returns an error if the connection is unusable.
    pub async fn ping(&self) -> ChatResult<()> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Decode a stored millisecond timestamp.
pub(crate) fn millis_to_utc(ms: i64) -> ChatResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ChatError::CorruptRecord(format!("invalid timestamp: {ms}")))
}

/// Decode a stored non-negative counter.
pub(crate) fn count_from_sql(value: i64) -> ChatResult<u64> {
    u64::try_from(value).map_err(|_| ChatError::CorruptRecord(format!("invalid count: {value}")))
}

/// Encode a counter for storage.
pub(crate) fn count_to_sql(value: u64) -> ChatResult<i64> {
    i64::try_from(value).map_err(|_| ChatError::Validation(format!("count exceeds i64: {value}")))
}

/// Encode a limit for a `LIMIT ?` parameter.
pub(crate) fn limit_to_sql(limit: usize) -> ChatResult<i64> {
    i64::try_from(limit).map_err(|_| ChatError::Validation("limit exceeds i64".to_string()))
}
