//! Incremental synchronization of host transcripts into the archive.
pub mod cursor;
pub mod discovery;
pub mod synchronizer;
pub mod watch;

pub use cursor::{CursorEntry, SyncCursor};
pub use discovery::{agent_id_for, discover_transcripts, TRANSCRIPT_EXTENSION};
pub use synchronizer::{SyncFailure, SyncOutcome, SyncSummary, Synchronizer, DEFAULT_COMPACTION_SLACK};
pub use watch::{WatchHandle, WatchOptions, WatchReport};
