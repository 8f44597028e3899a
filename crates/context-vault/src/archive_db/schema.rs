//! Row types for the archive database
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ArchiveError;

/// One conversation stream. Created on first append, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: i64,
}

/// An appended message. Rows are never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub message_index: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Caller-defined payload, returned exactly as it was appended.
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(ArchiveError::InvalidValue { kind: "role", value: other.to_string() }),
        }
    }
}

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointTrigger {
    Manual,
    Auto,
    PreCompaction,
}

impl CheckpointTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointTrigger::Manual => "manual",
            CheckpointTrigger::Auto => "auto",
            CheckpointTrigger::PreCompaction => "pre-compaction",
        }
    }
}

impl fmt::Display for CheckpointTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointTrigger {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(CheckpointTrigger::Manual),
            "auto" => Ok(CheckpointTrigger::Auto),
            "pre-compaction" => Ok(CheckpointTrigger::PreCompaction),
            other => Err(ArchiveError::InvalidValue { kind: "checkpoint trigger", value: other.to_string() }),
        }
    }
}

/// Whether the host produced a summary of the history it dropped.
///
/// The synchronizer cannot observe this, so detected compactions are recorded
/// as `Unknown`. Consumers that need a yes/no answer should go through
/// [`SummaryAvailability::assumed_available`] and treat the result as a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryAvailability {
    Yes,
    No,
    Unknown,
}

impl SummaryAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryAvailability::Yes => "yes",
            SummaryAvailability::No => "no",
            SummaryAvailability::Unknown => "unknown",
        }
    }

    /// Optimistic reading: anything but an explicit `No` counts as available.
    pub fn assumed_available(&self) -> bool {
        !matches!(self, SummaryAvailability::No)
    }
}

impl FromStr for SummaryAvailability {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(SummaryAvailability::Yes),
            "no" => Ok(SummaryAvailability::No),
            "unknown" => Ok(SummaryAvailability::Unknown),
            other => Err(ArchiveError::InvalidValue { kind: "summary availability", value: other.to_string() }),
        }
    }
}

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ArchiveError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_column!(Role);
text_column!(CheckpointTrigger);
text_column!(SummaryAvailability);

/// Named marker of a session's state at a point in time. Names may repeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: i64,
    pub session_id: String,
    pub name: String,
    pub trigger: CheckpointTrigger,
    pub message_count: i64,
    pub last_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A detected drop in a session's visible message count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionEvent {
    pub id: i64,
    pub session_id: String,
    pub detected_at: DateTime<Utc>,
    pub messages_before: i64,
    pub messages_after: i64,
    pub summary: SummaryAvailability,
}

/// A full-text match.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub message: StoredMessage,
    /// Message content with each matched term wrapped in `**`.
    pub highlighted: String,
    /// FTS5 rank; lower is a better match.
    pub rank: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub total_checkpoints: i64,
    pub total_compactions: i64,
    pub database_size_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub agent_id: Option<String>,
    pub message_count: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub system_messages: i64,
    pub checkpoints: i64,
    pub compactions: i64,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn unknown_summary_is_optimistic() {
        assert!(SummaryAvailability::Unknown.assumed_available());
        assert!(SummaryAvailability::Yes.assumed_available());
        assert!(!SummaryAvailability::No.assumed_available());
    }

    #[test]
    fn trigger_uses_kebab_case() {
        assert_eq!(CheckpointTrigger::PreCompaction.to_string(), "pre-compaction");
        assert_eq!(
            serde_json::to_string(&CheckpointTrigger::PreCompaction).unwrap(),
            "\"pre-compaction\""
        );
    }
}
