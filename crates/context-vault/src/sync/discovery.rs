//! Transcript discovery: `{agents_root}/{agent_id}/sessions/*.jsonl`.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

pub const TRANSCRIPT_EXTENSION: &str = "jsonl";
const SESSIONS_DIR: &str = "sessions";

/// List every transcript under `agents_root`, sorted by path.
///
/// Directory entries are included without opening them, so a dangling link or
/// unreadable file still shows up here and fails later, per file. A missing
/// root yields an empty list.
pub fn discover_transcripts(agents_root: &Path) -> Result<Vec<PathBuf>> {
    if !agents_root.exists() {
        warn!("Agents root {} does not exist", agents_root.display());
        return Ok(Vec::new());
    }

    let mut transcripts = Vec::new();
    for agent in std::fs::read_dir(agents_root)? {
        let agent_dir = match agent {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!("Cannot read entry under {}: {}", agents_root.display(), e);
                continue;
            }
        };
        let sessions_dir = agent_dir.join(SESSIONS_DIR);
        if !sessions_dir.is_dir() {
            continue;
        }

        let entries = match std::fs::read_dir(&sessions_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", sessions_dir.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(TRANSCRIPT_EXTENSION) {
                continue;
            }
            if path.is_dir() {
                continue;
            }
            transcripts.push(path);
        }
    }

    transcripts.sort();
    debug!("Discovered {} transcripts under {}", transcripts.len(), agents_root.display());
    Ok(transcripts)
}

/// The agent directory name for a transcript that follows the layout.
pub fn agent_id_for(transcript: &Path) -> Option<String> {
    let sessions_dir = transcript.parent()?;
    if sessions_dir.file_name()? != SESSIONS_DIR {
        return None;
    }
    sessions_dir
        .parent()?
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
