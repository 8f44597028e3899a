//! Transcript → archive synchronization.
//!
//! Each pass appends only the suffix of a transcript beyond what the archive
//! already holds for that session, so re-running over unchanged files is a
//! no-op and a restarted process resumes from the persisted counts.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::archive_db::{AppendParams, ArchiveDatabase, SummaryAvailability};
use crate::error::Result;
use crate::sync::cursor::SyncCursor;
use crate::sync::discovery;
use crate::transcript;

/// Shrinkage tolerated before a drop in message count counts as compaction.
pub const DEFAULT_COMPACTION_SLACK: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// `None` when the transcript has no session record.
    pub session_id: Option<String>,
    pub appended: usize,
    /// Messages persisted for the session after this sync.
    pub total: usize,
    pub compaction_detected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub total_appended: usize,
    pub sessions_updated: usize,
    pub files_scanned: usize,
    pub failures: Vec<SyncFailure>,
}

pub struct Synchronizer {
    db: Arc<ArchiveDatabase>,
    agents_root: PathBuf,
    compaction_slack: usize,
    cursor: SyncCursor,
}

impl Synchronizer {
    pub fn new(db: Arc<ArchiveDatabase>, agents_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            agents_root: agents_root.into(),
            compaction_slack: DEFAULT_COMPACTION_SLACK,
            cursor: SyncCursor::new(),
        }
    }

    pub fn with_compaction_slack(mut self, slack: usize) -> Self {
        self.compaction_slack = slack;
        self
    }

    pub fn database(&self) -> &Arc<ArchiveDatabase> {
        &self.db
    }

    pub fn agents_root(&self) -> &Path {
        &self.agents_root
    }

    pub fn cursor(&self) -> &SyncCursor {
        &self.cursor
    }

    /// Sync one transcript file. An unreadable file is an error; bad lines
    /// inside a readable file are not.
    pub fn synchronize_one(&mut self, path: &Path) -> Result<SyncOutcome> {
        let parsed = transcript::parse_file(path)?;
        let Some(session) = parsed.session else {
            debug!("No session record in {}, skipping", path.display());
            return Ok(SyncOutcome::default());
        };
        let session_id = session.id;
        let parsed_count = parsed.messages.len();

        let persisted = self.db.messages.message_count(&session_id)?;
        let prior = self.cursor.message_count(&session_id).unwrap_or(persisted);

        let compaction_detected = is_compaction(prior, parsed_count, self.compaction_slack);
        if compaction_detected {
            self.db.checkpoints.record_compaction(
                &session_id,
                prior as i64,
                parsed_count as i64,
                SummaryAvailability::Unknown,
            )?;
        }

        let agent_id = discovery::agent_id_for(path);
        let mut appended = 0;
        for (position, message) in parsed.messages.iter().enumerate().skip(persisted) {
            let metadata = serde_json::json!({
                "source_timestamp": message.timestamp,
                "source_index": position,
            })
            .to_string();
            self.db.messages.append(AppendParams {
                session_id: &session_id,
                agent_id: agent_id.as_deref(),
                role: message.role,
                content: &message.content,
                metadata: Some(&metadata),
            })?;
            appended += 1;
        }

        self.cursor.record(&session_id, parsed_count);

        if appended > 0 {
            info!("Synced {} new messages for session {}", appended, session_id);
        }
        Ok(SyncOutcome {
            session_id: Some(session_id),
            appended,
            total: persisted + appended,
            compaction_detected,
        })
    }

    /// Sync every discovered transcript in path order. A failing file is
    /// recorded in [`SyncSummary::failures`] and the pass moves on.
    pub fn synchronize_all(&mut self) -> Result<SyncSummary> {
        let transcripts = discovery::discover_transcripts(&self.agents_root)?;
        let mut summary = SyncSummary { files_scanned: transcripts.len(), ..Default::default() };

        for path in transcripts {
            match self.synchronize_one(&path) {
                Ok(outcome) => {
                    summary.total_appended += outcome.appended;
                    if outcome.appended > 0 {
                        summary.sessions_updated += 1;
                    }
                }
                Err(e) => {
                    warn!("Failed to sync {}: {}", path.display(), e);
                    summary.failures.push(SyncFailure { path, error: e.to_string() });
                }
            }
        }

        info!(
            "Sync pass: {} files, {} sessions updated, {} messages appended, {} failures",
            summary.files_scanned,
            summary.sessions_updated,
            summary.total_appended,
            summary.failures.len()
        );
        Ok(summary)
    }
}

/// `prior > 0` and `parsed < prior - slack`.
fn is_compaction(prior: usize, parsed: usize, slack: usize) -> bool {
    prior > 0 && parsed.saturating_add(slack) < prior
}
