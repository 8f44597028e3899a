//! Markdown recovery documents built from archived session state.
use chrono::{SecondsFormat, Utc};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::archive_db::{ArchiveDatabase, CompactionEvent, StoredMessage, SummaryAvailability};
use crate::error::Result;

/// Longest message body, in characters, rendered into a document.
pub const MAX_CONTENT_CHARS: usize = 2000;

pub struct RecoveryComposer {
    db: Arc<ArchiveDatabase>,
}

impl RecoveryComposer {
    pub fn new(db: Arc<ArchiveDatabase>) -> Self {
        Self { db }
    }

    /// Render the last `message_count` messages of a session, oldest first,
    /// after a header and the most recent compaction (if any). A session with
    /// no archived messages renders an empty conversation section.
    pub fn compose(&self, session_id: &str, message_count: usize) -> Result<String> {
        let mut messages = self.db.messages.query_messages(session_id, message_count, 0)?;
        messages.reverse();
        let compaction = self.db.checkpoints.latest_compaction(session_id)?;

        Ok(render(session_id, message_count, compaction.as_ref(), &messages))
    }

    /// [`compose`](Self::compose) and write the document to `output`.
    pub fn compose_to_file(&self, session_id: &str, message_count: usize, output: &Path) -> Result<String> {
        let document = self.compose(session_id, message_count)?;
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(output, &document)?;
        info!("Wrote recovery document for {} to {}", session_id, output.display());
        Ok(document)
    }
}

fn render(
    session_id: &str,
    requested: usize,
    compaction: Option<&CompactionEvent>,
    messages: &[StoredMessage],
) -> String {
    let mut doc = String::new();
    // Writing into a String cannot fail.
    let _ = render_into(&mut doc, session_id, requested, compaction, messages);
    doc
}

fn render_into(
    doc: &mut String,
    session_id: &str,
    requested: usize,
    compaction: Option<&CompactionEvent>,
    messages: &[StoredMessage],
) -> std::fmt::Result {
    writeln!(doc, "# Context Recovery: {session_id}\n")?;
    writeln!(doc, "- **Generated:** {}", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))?;
    writeln!(doc, "- **Messages requested:** {requested}")?;
    writeln!(doc, "- **Messages included:** {}\n", messages.len())?;

    if let Some(event) = compaction {
        writeln!(doc, "## Last Compaction\n")?;
        writeln!(doc, "- **Detected:** {}", event.detected_at.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        writeln!(doc, "- **Messages before:** {}", event.messages_before)?;
        writeln!(doc, "- **Messages after:** {}", event.messages_after)?;
        writeln!(doc, "- **Summary available:** {}\n", summary_label(event.summary))?;
    }

    writeln!(doc, "## Conversation\n")?;
    for message in messages {
        writeln!(doc, "### [{}] {}\n", message.timestamp.format("%H:%M:%S"), message.role)?;
        writeln!(doc, "{}\n", truncate_with_ellipsis(&message.content, MAX_CONTENT_CHARS))?;
    }
    Ok(())
}

fn summary_label(summary: SummaryAvailability) -> &'static str {
    match summary {
        SummaryAvailability::Yes => "yes",
        SummaryAvailability::No => "no",
        SummaryAvailability::Unknown => "unknown (assumed yes)",
    }
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive_db::{AppendParams, Role};

    fn composer_with(messages: &[(Role, &str)]) -> RecoveryComposer {
        let db = Arc::new(ArchiveDatabase::open_in_memory().unwrap());
        for &(role, content) in messages {
            db.messages
                .append(AppendParams { session_id: "s", agent_id: None, role, content, metadata: None })
                .unwrap();
        }
        RecoveryComposer::new(db)
    }

    #[test]
    fn test_three_messages_with_large_window() {
        let composer = composer_with(&[
            (Role::User, "first question"),
            (Role::Assistant, "first answer"),
            (Role::User, "second question"),
        ]);
        let doc = composer.compose("s", 50).unwrap();

        assert!(doc.starts_with("# Context Recovery: s\n"));
        assert!(doc.contains("- **Messages requested:** 50"));
        assert!(doc.contains("- **Messages included:** 3"));
        let first = doc.find("first question").unwrap();
        let answer = doc.find("first answer").unwrap();
        let second = doc.find("second question").unwrap();
        assert!(first < answer && answer < second);
        assert!(!doc.contains("## Last Compaction"));
    }

    #[test]
    fn test_window_keeps_most_recent_in_order() {
        let composer = composer_with(&[
            (Role::User, "m0"),
            (Role::Assistant, "m1"),
            (Role::User, "m2"),
            (Role::Assistant, "m3"),
        ]);
        let doc = composer.compose("s", 2).unwrap();
        assert!(!doc.contains("m0") && !doc.contains("m1"));
        assert!(doc.find("m2").unwrap() < doc.find("m3").unwrap());
        assert!(doc.contains("] assistant\n"));
    }

    #[test]
    fn test_empty_session_renders_empty_conversation() {
        let composer = composer_with(&[]);
        let doc = composer.compose("nobody", 50).unwrap();
        assert!(doc.contains("- **Messages included:** 0"));
        assert!(doc.trim_end().ends_with("## Conversation"));
    }

    #[test]
    fn test_latest_compaction_is_rendered() {
        let composer = composer_with(&[(Role::User, "hello")]);
        composer.db.checkpoints.record_compaction("s", 80, 12, SummaryAvailability::No).unwrap();
        composer.db.checkpoints.record_compaction("s", 100, 94, SummaryAvailability::Unknown).unwrap();

        let doc = composer.compose("s", 10).unwrap();
        assert!(doc.contains("- **Messages before:** 100"));
        assert!(doc.contains("- **Messages after:** 94"));
        assert!(doc.contains("- **Summary available:** unknown (assumed yes)"));
        assert!(!doc.contains("- **Messages before:** 80"));
        assert!(doc.find("## Last Compaction").unwrap() < doc.find("## Conversation").unwrap());
    }

    #[test]
    fn test_long_content_is_truncated() {
        let long = "é".repeat(MAX_CONTENT_CHARS + 10);
        let composer = composer_with(&[(Role::Assistant, &long)]);
        let doc = composer.compose("s", 1).unwrap();

        let expected = format!("{}...", "é".repeat(MAX_CONTENT_CHARS));
        assert!(doc.contains(&expected));
        assert!(!doc.contains(&"é".repeat(MAX_CONTENT_CHARS + 1)));
    }

    #[test]
    fn test_render_section_order() {
        let event = CompactionEvent {
            id: 1,
            session_id: "s".to_string(),
            detected_at: Utc::now(),
            messages_before: 30,
            messages_after: 3,
            summary: SummaryAvailability::Yes,
        };
        let doc = render("s", 7, Some(&event), &[]);
        let header = doc.find("- **Messages requested:** 7").unwrap();
        let compaction = doc.find("- **Summary available:** yes").unwrap();
        let conversation = doc.find("## Conversation").unwrap();
        assert!(header < compaction && compaction < conversation);
    }

    #[test]
    fn test_truncate_boundaries() {
        assert_eq!(truncate_with_ellipsis("abc", 3), "abc");
        assert_eq!(truncate_with_ellipsis("abcd", 3), "abc...");
        assert_eq!(truncate_with_ellipsis("", 3), "");
    }

    #[test]
    fn test_compose_to_file_writes_document() {
        let composer = composer_with(&[(Role::User, "persist me")]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("recovery").join("s.md");

        let doc = composer.compose_to_file("s", 5, &out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), doc);
        assert!(doc.contains("persist me"));
    }
}
