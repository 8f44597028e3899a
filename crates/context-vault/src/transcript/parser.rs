//! JSONL transcript parser.
//!
//! Every line is decoded on its own. A line that is not valid JSON, not UTF-8,
//! or not a recognized record shape is skipped; the rest of the file still parses.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, trace};

use crate::archive_db::Role;
use crate::error::Result;

/// The `session` header record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub id: String,
    pub timestamp: Option<String>,
}

/// A user or assistant turn whose flattened text is not empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    /// Source timestamp exactly as the host wrote it (string or epoch number).
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTranscript {
    pub session: Option<SessionDescriptor>,
    pub messages: Vec<TranscriptMessage>,
}

impl ParsedTranscript {
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }
}

/// One line of a transcript.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TranscriptRecord {
    Session {
        id: String,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    Message {
        message: RecordMessage,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RecordMessage {
    role: String,
    #[serde(default)]
    content: Option<RecordContent>,
    #[serde(default)]
    timestamp: Option<Value>,
}

/// Message content is either a plain string or a list of typed fragments.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordContent {
    Text(String),
    Fragments(Vec<ContentFragment>),
}

#[derive(Debug, Deserialize)]
struct ContentFragment {
    #[serde(rename = "type", default)]
    type_: String,
    #[serde(default)]
    text: Option<String>,
}

/// Join the text of `text` fragments with newlines; other fragments are dropped.
fn flatten(content: &RecordContent) -> String {
    match content {
        RecordContent::Text(text) => text.clone(),
        RecordContent::Fragments(fragments) => fragments
            .iter()
            .filter(|f| f.type_ == "text")
            .filter_map(|f| f.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Flatten a raw `content` value the same way the parser does. Returns `None`
/// for shapes that are neither a string nor a fragment list.
pub fn flatten_content(content: &Value) -> Option<String> {
    RecordContent::deserialize(content).ok().map(|c| flatten(&c))
}

fn timestamp_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn conversational_role(role: &str) -> Option<Role> {
    match role {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        _ => None,
    }
}

/// Parse transcript bytes. Pure; the same input always gives the same output.
pub fn parse_bytes(bytes: &[u8]) -> ParsedTranscript {
    let mut parsed = ParsedTranscript::default();

    for (line_no, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let record: TranscriptRecord = match serde_json::from_slice(line) {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping malformed transcript line {}: {}", line_no + 1, e);
                continue;
            }
        };

        match record {
            TranscriptRecord::Session { id, timestamp } => {
                if parsed.session.is_none() {
                    parsed.session = Some(SessionDescriptor { id, timestamp: timestamp_text(timestamp) });
                }
            }
            TranscriptRecord::Message { message } => {
                let Some(role) = conversational_role(&message.role) else {
                    trace!("Ignoring {} message on line {}", message.role, line_no + 1);
                    continue;
                };
                let content = message.content.as_ref().map(flatten).unwrap_or_default();
                if content.is_empty() {
                    continue;
                }
                parsed.messages.push(TranscriptMessage {
                    role,
                    content,
                    timestamp: timestamp_text(message.timestamp),
                });
            }
            TranscriptRecord::Other => {}
        }
    }

    parsed
}

/// Read and parse a whole transcript file. Only I/O failures are errors.
pub fn parse_file(path: &Path) -> Result<ParsedTranscript> {
    let bytes = std::fs::read(path)?;
    Ok(parse_bytes(&bytes))
}
