//! Archive database module - SQLite-backed append log of sessions, messages,
//! checkpoints and compaction events, with an FTS5 index over message content.
//!
//! The stores share one connection pool. Every write runs inside a
//! `BEGIN IMMEDIATE` transaction so a second process writing the same file
//! gets [`ArchiveError::StorageContention`] once the busy timeout expires.
pub mod checkpoint_store;
pub mod message_store;
pub mod migration;
pub mod schema;

pub use checkpoint_store::CheckpointStore;
pub use message_store::{AppendParams, MessageStore};
pub use migration::MigrationManager;
pub use schema::*;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ArchiveError, Result};

pub(crate) type Conn = PooledConnection<SqliteConnectionManager>;

/// Pool shared by the stores. Emptied by [`ArchiveDatabase::close`].
pub(crate) struct PoolHandle {
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
}

impl PoolHandle {
    fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool: RwLock::new(Some(pool)) }
    }

    pub(crate) fn get(&self) -> Result<Conn> {
        let pool = self
            .pool
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(ArchiveError::Closed)?;
        Ok(pool.get()?)
    }

    fn is_empty(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    fn take(&self) -> Option<Pool<SqliteConnectionManager>> {
        self.pool
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

pub struct ArchiveDatabase {
    pub messages: MessageStore,
    pub checkpoints: CheckpointStore,
    pool: Arc<PoolHandle>,
}

impl ArchiveDatabase {
    /// Open (or create) the archive at `db_path`, apply migrations and switch
    /// the file to WAL mode.
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        info!("Opening archive database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                    | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                conn.pragma_update(None, "foreign_keys", true)?;
                conn.pragma_update(None, "synchronous", "NORMAL")
            });
        let pool = Pool::builder().max_size(4).build(manager)?;

        {
            let mut conn = pool.get()?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("Archive journal mode: {}", mode);
            MigrationManager::new(&mut conn).initialize_database()?;
        }

        info!("Archive database initialized successfully");
        Ok(Self::from_pool(pool))
    }

    /// Private, non-durable archive. A single connection backs it, since every
    /// in-memory SQLite connection is its own database.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.pragma_update(None, "foreign_keys", true));
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>) -> Self {
        let pool = Arc::new(PoolHandle::new(pool));
        Self {
            messages: MessageStore::new(Arc::clone(&pool)),
            checkpoints: CheckpointStore::new(Arc::clone(&pool)),
            pool,
        }
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        let conn = self.pool.get()?;
        Ok(migration::get_database_stats(&conn)?)
    }

    /// Per-session counts, derived from the tables on every call.
    pub fn session_stats(&self, session_id: &str) -> Result<SessionStats> {
        let session = self.messages.get_session(session_id)?;
        let conn = self.pool.get()?;

        let (message_count, user_messages, assistant_messages, system_messages): (i64, i64, i64, i64) =
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(role = 'user'), 0),
                        COALESCE(SUM(role = 'assistant'), 0),
                        COALESCE(SUM(role = 'system'), 0)
                 FROM messages WHERE session_id = ?1",
                [session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        let (first, last): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM messages WHERE session_id = ?1",
            [session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let checkpoints: i64 = conn.query_row(
            "SELECT COUNT(*) FROM checkpoints WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;
        let compactions: i64 = conn.query_row(
            "SELECT COUNT(*) FROM compactions WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        Ok(SessionStats {
            session_id: session_id.to_string(),
            agent_id: session.and_then(|s| s.agent_id),
            message_count,
            user_messages,
            assistant_messages,
            system_messages,
            checkpoints,
            compactions,
            first_message_at: first.as_deref().and_then(parse_datetime_safe),
            last_message_at: last.as_deref().and_then(parse_datetime_safe),
        })
    }

    /// Flush the WAL and release every pooled connection. All later calls on
    /// this database or its stores return [`ArchiveError::Closed`].
    pub fn close(&self) -> Result<()> {
        match self.pool.take() {
            Some(pool) => {
                checkpoint_wal(&pool);
                info!("Archive database closed");
                Ok(())
            }
            None => Err(ArchiveError::Closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_empty()
    }
}

impl Drop for ArchiveDatabase {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            checkpoint_wal(&pool);
        }
    }
}

fn checkpoint_wal(pool: &Pool<SqliteConnectionManager>) {
    if let Ok(conn) = pool.get() {
        // wal_checkpoint reports a status row; a no-op on in-memory databases.
        if let Err(e) = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(())) {
            warn!("WAL checkpoint on close failed: {}", e);
        }
    }
}

/// Parse a stored timestamp, accepting RFC 3339 and SQLite's default format.
pub(crate) fn parse_datetime_safe(datetime_str: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{DateTime, NaiveDateTime, Utc};

    if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(db: &ArchiveDatabase, session_id: &str, role: Role, content: &str) {
        db.messages
            .append(AppendParams { session_id, agent_id: None, role, content, metadata: None })
            .unwrap();
    }

    #[test]
    fn stats_count_every_table() {
        let db = ArchiveDatabase::open_in_memory().unwrap();
        append(&db, "s1", Role::User, "hello");
        append(&db, "s1", Role::Assistant, "hi there");
        append(&db, "s2", Role::User, "another session");
        db.checkpoints.create_checkpoint("s1", "before-refactor", CheckpointTrigger::Manual).unwrap();
        db.checkpoints.record_compaction("s1", 40, 2, SummaryAvailability::Unknown).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.total_checkpoints, 1);
        assert_eq!(stats.total_compactions, 1);
    }

    #[test]
    fn session_stats_break_down_roles() {
        let db = ArchiveDatabase::open_in_memory().unwrap();
        append(&db, "s1", Role::User, "question");
        append(&db, "s1", Role::Assistant, "answer");
        append(&db, "s1", Role::User, "follow-up");
        append(&db, "other", Role::User, "noise");

        let stats = db.session_stats("s1").unwrap();
        assert_eq!(stats.message_count, 3);
        assert_eq!(stats.user_messages, 2);
        assert_eq!(stats.assistant_messages, 1);
        assert_eq!(stats.system_messages, 0);
        assert!(stats.first_message_at.is_some());
        assert!(stats.first_message_at <= stats.last_message_at);
    }

    #[test]
    fn session_stats_for_unknown_session_are_empty() {
        let db = ArchiveDatabase::open_in_memory().unwrap();
        let stats = db.session_stats("missing").unwrap();
        assert_eq!(stats.message_count, 0);
        assert!(stats.first_message_at.is_none());
    }

    #[test]
    fn operations_fail_after_close() {
        let db = ArchiveDatabase::open_in_memory().unwrap();
        append(&db, "s1", Role::User, "hello");
        db.close().unwrap();

        assert!(db.is_closed());
        assert!(matches!(db.stats(), Err(ArchiveError::Closed)));
        assert!(matches!(db.messages.query_messages("s1", 10, 0), Err(ArchiveError::Closed)));
        assert!(matches!(
            db.checkpoints.get_checkpoints("s1"),
            Err(ArchiveError::Closed)
        ));
        assert!(matches!(db.close(), Err(ArchiveError::Closed)));
    }

    #[test]
    fn is_closed_does_not_wait_for_a_connection() {
        let db = ArchiveDatabase::open_in_memory().unwrap();
        let _held = db.pool.get().unwrap();

        let started = std::time::Instant::now();
        assert!(!db.is_closed());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vault.db");
        {
            let db = ArchiveDatabase::open(&path, Duration::from_millis(500)).unwrap();
            append(&db, "s1", Role::User, "durable");
            db.close().unwrap();
        }
        let db = ArchiveDatabase::open(&path, Duration::from_millis(500)).unwrap();
        assert_eq!(db.messages.message_count("s1").unwrap(), 1);
        let hits = db.messages.search("durable", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn second_writer_sees_contention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let db = ArchiveDatabase::open(&path, Duration::from_millis(50)).unwrap();
        append(&db, "s1", Role::User, "first");

        let other = rusqlite::Connection::open(&path).unwrap();
        other.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let err = db
            .messages
            .append(AppendParams {
                session_id: "s1",
                agent_id: None,
                role: Role::User,
                content: "blocked",
                metadata: None,
            })
            .unwrap_err();
        assert!(err.is_contention(), "unexpected error: {err}");

        other.execute_batch("ROLLBACK;").unwrap();
        assert_eq!(db.messages.message_count("s1").unwrap(), 1);
    }

    #[test]
    fn parses_sqlite_default_timestamps() {
        assert!(parse_datetime_safe("2024-05-01 10:11:12").is_some());
        assert!(parse_datetime_safe("2024-05-01T10:11:12Z").is_some());
        assert!(parse_datetime_safe("not a date").is_none());
    }
}
