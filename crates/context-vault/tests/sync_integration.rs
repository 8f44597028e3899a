use context_vault::{
    ArchiveDatabase, ArchiveError, CheckpointTrigger, RecoveryComposer, Role, SummaryAvailability, Synchronizer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn write_transcript(root: &Path, agent: &str, session_id: &str, bodies: &[&str]) -> PathBuf {
    let dir = root.join(agent).join("sessions");
    std::fs::create_dir_all(&dir).unwrap();
    let mut lines = vec![
        serde_json::json!({"type": "session", "id": session_id, "timestamp": "2026-01-01T00:00:00Z"}).to_string(),
        "{ not json".to_string(),
    ];
    for (i, body) in bodies.iter().enumerate() {
        let role = if i % 2 == 0 { "user" } else { "assistant" };
        lines.push(
            serde_json::json!({"type": "message", "message": {"role": role, "content": body}}).to_string(),
        );
    }
    let path = dir.join(format!("{session_id}.jsonl"));
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn open(db_path: &Path) -> Arc<ArchiveDatabase> {
    Arc::new(ArchiveDatabase::open(db_path, Duration::from_secs(1)).unwrap())
}

#[test]
fn archive_survives_restart_and_compaction() {
    let agents = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let db_path = data.path().join("vault").join("vault.db");

    let bodies: Vec<String> = (0..20).map(|i| format!("discussing the deployment plan, step {i}")).collect();
    let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
    let path = write_transcript(agents.path(), "main", "sess-1", &refs);

    {
        let db = open(&db_path);
        let mut sync = Synchronizer::new(Arc::clone(&db), agents.path());
        let summary = sync.synchronize_all().unwrap();
        assert_eq!(summary.files_scanned, 1);
        assert_eq!(summary.total_appended, 20);
        assert!(summary.failures.is_empty());
        db.close().unwrap();
    }

    // A fresh process resumes from the persisted count.
    let db = open(&db_path);
    let mut sync = Synchronizer::new(Arc::clone(&db), agents.path());
    assert_eq!(sync.synchronize_all().unwrap().total_appended, 0);
    assert_eq!(db.messages.message_count("sess-1").unwrap(), 20);

    let session = db.messages.get_session("sess-1").unwrap().unwrap();
    assert_eq!(session.agent_id.as_deref(), Some("main"));

    // The host compacts the transcript down to a summary plus two turns.
    write_transcript(agents.path(), "main", "sess-1", &["summary of earlier work", "latest question"]);
    let outcome = sync.synchronize_one(&path).unwrap();
    assert!(outcome.compaction_detected);
    assert_eq!(outcome.appended, 0);
    assert_eq!(db.messages.message_count("sess-1").unwrap(), 20);

    let compaction = db.checkpoints.latest_compaction("sess-1").unwrap().unwrap();
    assert_eq!((compaction.messages_before, compaction.messages_after), (20, 2));
    assert_eq!(compaction.summary, SummaryAvailability::Unknown);

    let hits = db.messages.search("deployment", Some("sess-1"), 5).unwrap();
    assert_eq!(hits.len(), 5);
    assert!(hits[0].highlighted.contains("**deployment**"));

    let doc = RecoveryComposer::new(Arc::clone(&db)).compose("sess-1", 3).unwrap();
    assert!(doc.contains("- **Messages included:** 3"));
    assert!(doc.contains("step 19"));
    assert!(!doc.contains("step 16"));
    assert!(doc.contains("unknown (assumed yes)"));

    db.close().unwrap();
}

#[test]
fn checkpoints_and_stats_through_public_api() {
    let data = tempfile::tempdir().unwrap();
    let db = open(&data.path().join("vault.db"));

    for (role, content) in [(Role::User, "hi"), (Role::Assistant, "hello"), (Role::User, "bye")] {
        db.messages
            .append(context_vault::AppendParams {
                session_id: "s",
                agent_id: Some("ops"),
                role,
                content,
                metadata: None,
            })
            .unwrap();
    }

    let checkpoint = db.checkpoints.create_checkpoint("s", "before-refactor", CheckpointTrigger::Manual).unwrap();
    assert_eq!(checkpoint.message_count, 3);
    assert!(checkpoint.last_message_id.is_some());

    let err = db.checkpoints.create_checkpoint("ghost", "x", CheckpointTrigger::Auto).unwrap_err();
    assert!(matches!(err, ArchiveError::SessionNotFound(_)));

    let stats = db.session_stats("s").unwrap();
    assert_eq!((stats.user_messages, stats.assistant_messages), (2, 1));
    assert_eq!(stats.checkpoints, 1);

    let totals = db.stats().unwrap();
    assert_eq!(totals.total_sessions, 1);
    assert_eq!(totals.total_messages, 3);
    assert!(totals.database_size_bytes > 0);

    db.close().unwrap();
    assert!(matches!(db.messages.message_count("s"), Err(ArchiveError::Closed)));
}
