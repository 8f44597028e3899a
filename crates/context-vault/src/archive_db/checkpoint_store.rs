//! Checkpoint and compaction-event storage
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use tracing::{info, warn};

use crate::archive_db::schema::*;
use crate::archive_db::{parse_datetime_safe, PoolHandle};
use crate::error::{ArchiveError, Result};

pub struct CheckpointStore {
    pool: Arc<PoolHandle>,
}

impl CheckpointStore {
    pub(crate) fn new(pool: Arc<PoolHandle>) -> Self {
        Self { pool }
    }

    /// Capture the session's current message count and last message under
    /// `name`. Names are not unique; repeated names produce separate rows.
    pub fn create_checkpoint(&self, session_id: &str, name: &str, trigger: CheckpointTrigger) -> Result<Checkpoint> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_session(&tx, session_id)?;

        let (message_count, last_message_id): (i64, Option<i64>) = tx.query_row(
            "SELECT COUNT(*),
                    (SELECT id FROM messages WHERE session_id = ?1 ORDER BY message_index DESC LIMIT 1)
             FROM messages WHERE session_id = ?1",
            [session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let now = Utc::now();
        tx.execute(
            "INSERT INTO checkpoints (session_id, name, trigger_kind, message_count, last_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![session_id, name, trigger, message_count, last_message_id, now.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            "Created {} checkpoint '{}' for session {} at {} messages",
            trigger, name, session_id, message_count
        );
        Ok(Checkpoint {
            id,
            session_id: session_id.to_string(),
            name: name.to_string(),
            trigger,
            message_count,
            last_message_id,
            created_at: now,
        })
    }

    /// Newest first.
    pub fn get_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, name, trigger_kind, message_count, last_message_id, created_at
             FROM checkpoints WHERE session_id = ?1 ORDER BY id DESC",
        )?;
        let checkpoints = stmt
            .query_map([session_id], row_to_checkpoint)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(checkpoints)
    }

    pub fn record_compaction(
        &self,
        session_id: &str,
        messages_before: i64,
        messages_after: i64,
        summary: SummaryAvailability,
    ) -> Result<CompactionEvent> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_session(&tx, session_id)?;

        let now = Utc::now();
        tx.execute(
            "INSERT INTO compactions (session_id, detected_at, messages_before, messages_after, summary)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, now.to_rfc3339(), messages_before, messages_after, summary],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        warn!(
            "Compaction detected in session {}: {} -> {} messages",
            session_id, messages_before, messages_after
        );
        Ok(CompactionEvent {
            id,
            session_id: session_id.to_string(),
            detected_at: now,
            messages_before,
            messages_after,
            summary,
        })
    }

    /// Newest first.
    pub fn get_compactions(&self, session_id: &str) -> Result<Vec<CompactionEvent>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, detected_at, messages_before, messages_after, summary
             FROM compactions WHERE session_id = ?1 ORDER BY id DESC",
        )?;
        let events = stmt
            .query_map([session_id], row_to_compaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    pub fn latest_compaction(&self, session_id: &str) -> Result<Option<CompactionEvent>> {
        let conn = self.pool.get()?;
        let event = conn
            .query_row(
                "SELECT id, session_id, detected_at, messages_before, messages_after, summary
                 FROM compactions WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                [session_id],
                row_to_compaction,
            )
            .optional()?;
        Ok(event)
    }
}

fn ensure_session(conn: &Connection, session_id: &str) -> Result<()> {
    let exists = conn
        .query_row("SELECT 1 FROM sessions WHERE id = ?1", [session_id], |_| Ok(()))
        .optional()?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(ArchiveError::SessionNotFound(session_id.to_string()))
    }
}

fn row_to_checkpoint(row: &Row) -> rusqlite::Result<Checkpoint> {
    let created_at = parse_datetime_safe(&row.get::<_, String>(6)?).unwrap_or_else(|| {
        warn!("Failed parse checkpoint created_at");
        Utc::now()
    });

    Ok(Checkpoint {
        id: row.get(0)?,
        session_id: row.get(1)?,
        name: row.get(2)?,
        trigger: row.get(3)?,
        message_count: row.get(4)?,
        last_message_id: row.get(5)?,
        created_at,
    })
}

fn row_to_compaction(row: &Row) -> rusqlite::Result<CompactionEvent> {
    let detected_at = parse_datetime_safe(&row.get::<_, String>(2)?).unwrap_or_else(|| {
        warn!("Failed parse compaction detected_at");
        Utc::now()
    });

    Ok(CompactionEvent {
        id: row.get(0)?,
        session_id: row.get(1)?,
        detected_at,
        messages_before: row.get(3)?,
        messages_after: row.get(4)?,
        summary: row.get(5)?,
    })
}
