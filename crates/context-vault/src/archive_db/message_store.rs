//! Session and message storage: the append path and the read/search surface.
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::archive_db::schema::*;
use crate::archive_db::{parse_datetime_safe, PoolHandle};
use crate::error::{ArchiveError, Result};

/// Input to [`MessageStore::append`].
#[derive(Debug, Clone, Copy)]
pub struct AppendParams<'a> {
    pub session_id: &'a str,
    /// Recorded on the session row the first time it is known.
    pub agent_id: Option<&'a str>,
    pub role: Role,
    pub content: &'a str,
    pub metadata: Option<&'a str>,
}

const MESSAGE_COLUMNS: &str =
    "m.id, m.session_id, m.message_index, m.role, m.content, m.timestamp, m.metadata";

pub struct MessageStore {
    pool: Arc<PoolHandle>,
}

impl MessageStore {
    pub(crate) fn new(pool: Arc<PoolHandle>) -> Self {
        Self { pool }
    }

    /// Append one message to the end of a session, creating the session if
    /// needed. The index is `max(existing) + 1`, starting at 0. The session
    /// row, the message row and its full-text entry commit together.
    pub fn append(&self, params: AppendParams<'_>) -> Result<StoredMessage> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        let now_str = now.to_rfc3339();

        tx.execute(
            "INSERT INTO sessions (id, agent_id, created_at, last_activity, message_count)
             VALUES (?1, ?2, ?3, ?3, 0)
             ON CONFLICT(id) DO UPDATE SET agent_id = COALESCE(sessions.agent_id, excluded.agent_id)",
            params![params.session_id, params.agent_id, &now_str],
        )?;

        let message_index: i64 = tx.query_row(
            "SELECT COALESCE(MAX(message_index), -1) + 1 FROM messages WHERE session_id = ?1",
            [params.session_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO messages (session_id, message_index, role, content, timestamp, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                params.session_id,
                message_index,
                params.role,
                params.content,
                &now_str,
                params.metadata,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE sessions SET message_count = message_count + 1, last_activity = ?1 WHERE id = ?2",
            params![&now_str, params.session_id],
        )?;

        tx.commit()?;

        debug!("Appended message {} to session {}", message_index, params.session_id);
        Ok(StoredMessage {
            id,
            session_id: params.session_id.to_string(),
            message_index,
            role: params.role,
            content: params.content.to_string(),
            timestamp: now,
            metadata: params.metadata.map(str::to_string),
        })
    }

    /// Newest first, `limit` rows starting `offset` rows from the newest.
    pub fn query_messages(&self, session_id: &str, limit: usize, offset: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             WHERE m.session_id = ?1
             ORDER BY m.message_index DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let messages = stmt
            .query_map(params![session_id, limit as i64, offset as i64], row_to_stored_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Full-text search over message content using FTS5 query syntax
    /// (tokens, `"quoted phrases"`, `OR`, `prefix*`), best matches first.
    pub fn search(&self, query: &str, session_id: Option<&str>, limit: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(ArchiveError::QuerySyntax("empty search query".to_string()));
        }

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS},
                    highlight(messages_fts, 0, '**', '**') AS highlighted,
                    bm25(messages_fts) AS rank
             FROM messages_fts
             JOIN messages m ON m.id = messages_fts.rowid
             WHERE messages_fts MATCH ?1
               AND (?2 IS NULL OR m.session_id = ?2)
             ORDER BY rank
             LIMIT ?3"
        ))?;

        let hits = stmt
            .query_map(params![query, session_id, limit as i64], |row| {
                Ok(SearchHit {
                    message: row_to_stored_message(row)?,
                    highlighted: row.get(7)?,
                    rank: row.get(8)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(map_query_error)?;

        debug!("Search {:?} returned {} hits", query, hits.len());
        Ok(hits)
    }

    /// Number of messages persisted for a session; 0 for unknown sessions.
    pub fn message_count(&self, session_id: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.pool.get()?;
        let session = conn
            .query_row(
                "SELECT id, agent_id, created_at, last_activity, message_count
                 FROM sessions WHERE id = ?1",
                [session_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Most recently active sessions first.
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, agent_id, created_at, last_activity, message_count
             FROM sessions ORDER BY last_activity DESC, id LIMIT ?1",
        )?;
        let sessions = stmt
            .query_map([limit as i64], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }
}

/// FTS5 reports malformed MATCH expressions as generic SQLITE_ERROR failures.
fn map_query_error(e: rusqlite::Error) -> ArchiveError {
    match &e {
        rusqlite::Error::SqliteFailure(err, msg) if err.code == rusqlite::ErrorCode::Unknown => {
            ArchiveError::QuerySyntax(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => e.into(),
    }
}

pub(crate) fn row_to_stored_message(row: &Row) -> rusqlite::Result<StoredMessage> {
    let timestamp = parse_datetime_safe(&row.get::<_, String>(5)?).unwrap_or_else(|| {
        warn!("Failed parse message timestamp");
        Utc::now()
    });

    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        message_index: row.get(2)?,
        role: row.get(3)?,
        content: row.get(4)?,
        timestamp,
        metadata: row.get(6)?,
    })
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let created_at = parse_datetime_safe(&row.get::<_, String>(2)?).unwrap_or_else(|| {
        warn!("Failed parse created_at");
        Utc::now()
    });
    let last_activity = parse_datetime_safe(&row.get::<_, String>(3)?).unwrap_or_else(|| {
        warn!("Failed parse last_activity");
        Utc::now()
    });

    Ok(Session {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        created_at,
        last_activity,
        message_count: row.get(4)?,
    })
}
