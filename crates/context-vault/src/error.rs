//! Error types shared by the archive, synchronizer and recovery composer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Another writer holds the database write lock.
    #[error("storage is locked by another writer: {0}")]
    StorageContention(String),

    /// Full-text query rejected by the search engine. Carries the engine's message verbatim.
    #[error("invalid search query: {0}")]
    QuerySyntax(String),

    #[error("archive has been closed")]
    Closed,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("unknown {kind} value: {value}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

impl From<rusqlite::Error> for ArchiveError {
    fn from(e: rusqlite::Error) -> Self {
        if is_lock_error(&e) {
            ArchiveError::StorageContention(e.to_string())
        } else {
            ArchiveError::Database(e)
        }
    }
}

impl ArchiveError {
    pub fn is_contention(&self) -> bool {
        matches!(self, ArchiveError::StorageContention(_))
    }
}

fn is_lock_error(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_contention() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let mapped: ArchiveError = err.into();
        assert!(mapped.is_contention());
    }

    #[test]
    fn other_failures_stay_database_errors() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        let mapped: ArchiveError = err.into();
        assert!(matches!(mapped, ArchiveError::Database(_)));
    }
}
