//! Host session transcripts: newline-delimited JSON, one file per session.
//!
//! Transcripts live under `{agents_root}/{agent_id}/sessions/{session}.jsonl`.

mod parser;

pub use parser::{
    flatten_content, parse_bytes, parse_file, ParsedTranscript, SessionDescriptor, TranscriptMessage,
};
