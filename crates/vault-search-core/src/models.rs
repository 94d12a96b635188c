//! Core data models used throughout Vault Search.
//!
//! These types represent the chunks and source records that flow through
//! the segmentation and retrieval pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which kind of source record a chunk was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    File,
    Email,
    Slack,
    Transcript,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::File => "file",
            SourceType::Email => "email",
            SourceType::Slack => "slack",
            SourceType::Transcript => "transcript",
        };
        f.write_str(s)
    }
}

/// First and last time markers covered by a chunk.
///
/// Timestamps are carried as they appear in the source: `H:MM` markers for
/// meeting transcripts, Unix-seconds strings for chat messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// The unit of retrieval produced by the segmenter.
///
/// Chunks are created per-ingestion-call and never mutated afterwards.
/// `size` is the byte length of the (trimmed) `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Trimmed chunk content. Never empty.
    pub text: String,
    /// 0-based position among chunks produced from the same parent record.
    pub index: usize,
    pub source_type: SourceType,
    /// Opaque identifier of the parent record (file path, email hash,
    /// channel+date, meeting id).
    pub source_key: String,
    /// Byte length of `text`.
    pub size: usize,
    /// Distinct speaker/sender identifiers in first-seen order.
    /// Populated for transcript and chat chunks only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub speakers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    pub is_transcript: bool,
}

/// A reaction attached to a chat message (emoji name plus count).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    pub count: u32,
}

/// A single chat message as handed over by the upstream loader.
///
/// The loader is responsible for resolving user IDs to display names and
/// for dropping system messages; the chunker only sees conversational
/// content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    /// Unix timestamp in seconds (fractional part preserved from the
    /// source export).
    pub ts: f64,
    pub text: String,
    /// Names of attached files, if any.
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

/// An email message already parsed by the upstream loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}
