//! Time-windowed chunking for chat channels.
//!
//! Messages are first clustered into conversational windows: a new window
//! starts whenever the gap between two consecutive messages exceeds the
//! configured window size. Within a window, messages are rendered as
//! `[HH:MM] sender: text` (with inline markers for attachments and
//! reactions) and joined by blank lines, then windowed with the usual
//! target/min/max/overlap parameters — except that cut points always land
//! on a message boundary, so no message is ever split across two chunks.

use chrono::DateTime;

use crate::models::{ChatMessage, Chunk, SourceType, TimeRange};

use super::{snap_to_char_boundary, ChunkingConfig, ConfigError};

/// How far (in bytes) before the target cut to start looking for the next
/// message boundary.
const BOUNDARY_SEARCH_RANGE: usize = 200;

/// Chat chunking parameters: plain windowing plus the time-window gap.
#[derive(Debug, Clone, Copy)]
pub struct ChatChunkingConfig {
    window: ChunkingConfig,
    time_window_minutes: u64,
}

impl ChatChunkingConfig {
    pub fn new(window: ChunkingConfig, time_window_minutes: u64) -> Result<Self, ConfigError> {
        if time_window_minutes == 0 {
            return Err(ConfigError::ZeroSize);
        }
        Ok(Self {
            window,
            time_window_minutes,
        })
    }

    /// Preset for Slack-style channels: 1800/500/2200, 300 bytes overlap,
    /// 15-minute conversation windows.
    pub fn slack() -> Self {
        Self {
            window: ChunkingConfig {
                target_size: 1800,
                min_size: 500,
                max_size: 2200,
                overlap: 300,
            },
            time_window_minutes: 15,
        }
    }

    pub fn window(&self) -> &ChunkingConfig {
        &self.window
    }

    pub fn time_window_minutes(&self) -> u64 {
        self.time_window_minutes
    }
}

/// Render one message for embedding: clock time, sender, text, plus
/// inline markers for attachments and reactions.
fn format_message(msg: &ChatMessage) -> String {
    let time = DateTime::from_timestamp(msg.ts as i64, 0)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|| "??:??".to_string());

    let mut formatted = format!("[{time}] {}: {}", msg.sender, msg.text);

    if !msg.attachments.is_empty() {
        formatted.push_str(&format!("\n[Attached: {}]", msg.attachments.join(", ")));
    }
    if !msg.reactions.is_empty() {
        let reactions = msg
            .reactions
            .iter()
            .map(|r| format!(":{}:x{}", r.name, r.count))
            .collect::<Vec<_>>()
            .join(" ");
        formatted.push_str(&format!("\n[Reactions: {reactions}]"));
    }

    formatted
}

/// Cluster messages into conversational windows using the gap rule: a new
/// window starts whenever the gap between consecutive message timestamps
/// exceeds the window size.
fn group_by_time_window(messages: &[ChatMessage], window_minutes: u64) -> Vec<Vec<&ChatMessage>> {
    let window_secs = (window_minutes * 60) as f64;
    let mut groups: Vec<Vec<&ChatMessage>> = Vec::new();
    let mut current: Vec<&ChatMessage> = Vec::new();
    let mut last_ts = f64::NEG_INFINITY;

    for msg in messages {
        if !current.is_empty() && msg.ts - last_ts > window_secs {
            groups.push(std::mem::take(&mut current));
        }
        current.push(msg);
        last_ts = msg.ts;
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

/// Chunk a day's worth of channel messages.
///
/// `source_key` identifies the parent record (typically `channel:date`).
/// Messages with empty text are skipped; windows whose rendered text is
/// below `min_size` are skipped entirely. Chunk indices run across all
/// windows of the record.
pub fn chunk_chat(
    messages: &[ChatMessage],
    source_key: &str,
    config: &ChatChunkingConfig,
) -> Vec<Chunk> {
    let mut ordered: Vec<&ChatMessage> = messages
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .collect();
    ordered.sort_by(|a, b| a.ts.partial_cmp(&b.ts).unwrap_or(std::cmp::Ordering::Equal));

    if ordered.is_empty() {
        return Vec::new();
    }

    let owned: Vec<ChatMessage> = ordered.into_iter().cloned().collect();
    let groups = group_by_time_window(&owned, config.time_window_minutes);
    let window = &config.window;
    let mut chunks: Vec<Chunk> = Vec::new();

    for group in &groups {
        let group_text = group
            .iter()
            .map(|m| format_message(m))
            .collect::<Vec<_>>()
            .join("\n\n");

        if group_text.len() < window.min_size() {
            continue;
        }

        let mut speakers: Vec<String> = Vec::new();
        for msg in group {
            if !speakers.contains(&msg.sender) {
                speakers.push(msg.sender.clone());
            }
        }
        let range = TimeRange {
            start: format_ts(group[0].ts),
            end: format_ts(group[group.len() - 1].ts),
        };

        if group_text.len() <= window.max_size() {
            chunks.push(chat_chunk(
                &group_text,
                chunks.len(),
                source_key,
                &speakers,
                &range,
            ));
            continue;
        }

        // Window split on message boundaries only.
        let mut start = 0usize;
        while start < group_text.len() {
            let mut end = (start + window.target_size()).min(group_text.len());
            if end < group_text.len() {
                let search_from = snap_to_char_boundary(
                    &group_text,
                    end.saturating_sub(BOUNDARY_SEARCH_RANGE).max(start),
                );
                end = match group_text[search_from..].find("\n\n") {
                    Some(pos) => search_from + pos + 2,
                    None => group_text.len(),
                };
            }

            let text = group_text[start..end].trim();
            if text.len() >= window.min_size() / 2 {
                chunks.push(chat_chunk(text, chunks.len(), source_key, &speakers, &range));
            }

            if end >= group_text.len() {
                break;
            }
            let next = snap_to_char_boundary(&group_text, end.saturating_sub(window.overlap()));
            if next <= start {
                break;
            }
            start = next;
        }
    }

    chunks
}

fn chat_chunk(
    text: &str,
    index: usize,
    source_key: &str,
    speakers: &[String],
    range: &TimeRange,
) -> Chunk {
    Chunk {
        text: text.to_string(),
        index,
        source_type: SourceType::Slack,
        source_key: source_key.to_string(),
        size: text.len(),
        speakers: speakers.to_vec(),
        time_range: Some(range.clone()),
        is_transcript: false,
    }
}

fn format_ts(ts: f64) -> String {
    format!("{ts:.6}")
}
