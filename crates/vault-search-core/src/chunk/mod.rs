//! Type-aware content segmentation.
//!
//! Turns raw text (plus lightweight source hints) into an ordered sequence
//! of [`Chunk`]s. Four policies exist, selected by content type:
//!
//! - **Plain documents**: sliding window of `target_size` bytes, cut moved
//!   to the nearest paragraph boundary (`\n\n`) within ±200 bytes, window
//!   advanced by `target_size − overlap`.
//! - **Meeting transcripts**: parsed into `[H:MM] speaker: utterance`
//!   turns, accumulated up to `max_size` with sentence-aligned overlap,
//!   tracking the speaker set and time range per chunk ([`transcript`]).
//! - **Chat messages**: grouped into time windows, formatted, and windowed
//!   on message boundaries ([`chat`]).
//! - **Emails**: signature/boilerplate stripped, subject prepended, then
//!   chunked like a plain document ([`email`]).
//!
//! Chunking never fails: empty or all-whitespace input yields an empty
//! sequence, and inputs below [`ABSOLUTE_FLOOR`] bytes are wrapped as a
//! single chunk without classification. Invalid configurations are
//! rejected at construction time by [`ChunkingConfig::new`], never
//! per-call.

pub mod chat;
pub mod email;
pub mod transcript;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::{Chunk, SourceType};

pub use chat::{chunk_chat, ChatChunkingConfig};
pub use email::{chunk_email, strip_signature};
pub use transcript::chunk_transcript;

/// Inputs shorter than this many bytes are always returned as a single
/// chunk, skipping classification entirely.
pub const ABSOLUTE_FLOOR: usize = 500;

/// How far (in bytes) around the target cut point to search for a
/// paragraph boundary before giving up and cutting mid-paragraph.
const PARAGRAPH_SEARCH_RANGE: usize = 200;

static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d{1,2}:\d{2}\]").expect("timestamp regex"));

/// Error produced when a [`ChunkingConfig`] violates its invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("overlap ({overlap}) must be smaller than target_size ({target_size})")]
    OverlapTooLarge { overlap: usize, target_size: usize },
    #[error("target_size ({target_size}) must not exceed max_size ({max_size})")]
    TargetExceedsMax { target_size: usize, max_size: usize },
    #[error("min_size ({min_size}) must not exceed target_size ({target_size})")]
    MinExceedsTarget { min_size: usize, target_size: usize },
    #[error("chunk sizes must be non-zero")]
    ZeroSize,
}

/// Immutable windowing parameters, validated at construction.
///
/// Invariants: `overlap < target_size ≤ max_size` and
/// `min_size ≤ target_size`. Use the presets ([`ChunkingConfig::document`]
/// and friends) or [`ChunkingConfig::new`] to build one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    target_size: usize,
    min_size: usize,
    max_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    /// Build a config, failing fast if the invariants do not hold.
    pub fn new(
        target_size: usize,
        min_size: usize,
        max_size: usize,
        overlap: usize,
    ) -> Result<Self, ConfigError> {
        if target_size == 0 || max_size == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if overlap >= target_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap,
                target_size,
            });
        }
        if target_size > max_size {
            return Err(ConfigError::TargetExceedsMax {
                target_size,
                max_size,
            });
        }
        if min_size > target_size {
            return Err(ConfigError::MinExceedsTarget {
                min_size,
                target_size,
            });
        }
        Ok(Self {
            target_size,
            min_size,
            max_size,
            overlap,
        })
    }

    /// Preset for plain documents: 1800/1000/2200 with 300 bytes overlap.
    pub fn document() -> Self {
        Self {
            target_size: 1800,
            min_size: 1000,
            max_size: 2200,
            overlap: 300,
        }
    }

    /// Preset for meeting transcripts. Uses a larger overlap than plain
    /// documents so conversational context carries across chunks.
    pub fn transcript() -> Self {
        Self {
            target_size: 1800,
            min_size: 1200,
            max_size: 2200,
            overlap: 400,
        }
    }

    /// Preset for emails, which tend to run shorter than documents.
    pub fn email() -> Self {
        Self {
            target_size: 1500,
            min_size: 200,
            max_size: 2000,
            overlap: 300,
        }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

/// The configs [`smart_chunk`] chooses between after classification.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingProfiles {
    pub document: ChunkingConfig,
    pub transcript: ChunkingConfig,
}

impl Default for ChunkingProfiles {
    fn default() -> Self {
        Self {
            document: ChunkingConfig::document(),
            transcript: ChunkingConfig::transcript(),
        }
    }
}

/// Detect whether content is a meeting transcript.
///
/// A text is a transcript if it contains at least 3 non-overlapping
/// bracketed timestamp markers (`[H:MM]` or `[HH:MM]`). This is a
/// heuristic, not a parser; it runs in a single linear scan.
pub fn is_transcript(content: &str) -> bool {
    TIMESTAMP_RE.find_iter(content).take(3).count() >= 3
}

/// Chunk content based on automatic type detection.
///
/// Uses [`is_transcript`] as the classifier and the default
/// [`ChunkingProfiles`]. See [`smart_chunk_with`] for the full contract.
pub fn smart_chunk(content: &str, source_key: &str) -> Vec<Chunk> {
    smart_chunk_with(content, source_key, &ChunkingProfiles::default(), is_transcript)
}

/// Chunk content with an injectable transcript detector.
///
/// The detector is a plain predicate so alternate classifiers (e.g.
/// structured-field presence) can replace the timestamp heuristic without
/// touching the windowing logic.
///
/// # Edge cases
///
/// - Empty or all-whitespace input yields an empty sequence.
/// - Input shorter than [`ABSOLUTE_FLOOR`] bytes yields exactly one chunk
///   containing the trimmed input, skipping classification.
pub fn smart_chunk_with(
    content: &str,
    source_key: &str,
    profiles: &ChunkingProfiles,
    detector: impl Fn(&str) -> bool,
) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    if content.len() < ABSOLUTE_FLOOR {
        return vec![make_chunk(content.trim(), 0, SourceType::File, source_key)];
    }

    if detector(content) {
        chunk_transcript(content, source_key, &profiles.transcript)
    } else {
        chunk_document(content, source_key, SourceType::File, &profiles.document)
    }
}

/// Chunk a plain document with the sliding-window policy.
///
/// Windows are `target_size` bytes; if a paragraph boundary (`\n\n`)
/// exists within [`PARAGRAPH_SEARCH_RANGE`] bytes of the natural cut, the
/// cut moves there instead of splitting mid-paragraph. The window then
/// advances by `target_size − overlap`. A trailing fragment shorter than
/// `min_size / 2` is discarded as noise.
///
/// Content shorter than `max_size` is wrapped as a single chunk without
/// windowing.
pub fn chunk_document(
    content: &str,
    source_key: &str,
    source_type: SourceType,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    if content.len() < config.max_size {
        return vec![make_chunk(content.trim(), 0, source_type, source_key)];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < content.len() {
        let mut end = start + config.target_size;

        if end < content.len() {
            let search_from = snap_to_char_boundary(
                content,
                end.saturating_sub(PARAGRAPH_SEARCH_RANGE).max(start),
            );
            if let Some(pos) = content[search_from..].find("\n\n") {
                let boundary = search_from + pos;
                if boundary < end + PARAGRAPH_SEARCH_RANGE {
                    end = boundary + 2;
                }
            }
        } else {
            end = content.len();
        }

        let end = snap_to_char_boundary(content, end.min(content.len()));
        let text = content[start..end].trim();

        if text.len() >= config.min_size / 2 {
            chunks.push(make_chunk(text, chunks.len(), source_type, source_key));
        }

        if end >= content.len() {
            break;
        }
        let next = snap_to_char_boundary(content, end.saturating_sub(config.overlap));
        if next <= start {
            break;
        }
        start = next;
    }

    chunks
}

pub(crate) fn make_chunk(
    text: &str,
    index: usize,
    source_type: SourceType,
    source_key: &str,
) -> Chunk {
    Chunk {
        text: text.to_string(),
        index,
        source_type,
        source_key: source_key.to_string(),
        size: text.len(),
        speakers: Vec::new(),
        time_range: None,
        is_transcript: false,
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
pub(crate) fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
