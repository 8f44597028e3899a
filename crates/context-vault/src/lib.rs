// context-vault/src/lib.rs

pub mod archive_db;
pub mod config;
pub mod error;
pub mod recovery;
pub mod sync;
pub mod telemetry;
pub mod transcript;

// Public API exports
pub use archive_db::{
    AppendParams, ArchiveDatabase, Checkpoint, CheckpointTrigger, CompactionEvent, DatabaseStats, Role,
    SearchHit, Session, SessionStats, StoredMessage, SummaryAvailability,
};
pub use config::VaultConfig;
pub use error::{ArchiveError, Result};
pub use recovery::RecoveryComposer;
pub use sync::{SyncOutcome, SyncSummary, Synchronizer, WatchHandle, WatchOptions, WatchReport};
