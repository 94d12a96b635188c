//! Speaker-aware chunking for meeting transcripts.
//!
//! A transcript is a sequence of turns of the form
//! `[H:MM] speaker: utterance`. Turns are parsed in a single regex pass,
//! filtered of boilerplate acknowledgements, and accumulated into chunks
//! bounded by `max_size`. Each closed chunk records the distinct speakers
//! seen and the `[first, last]` timestamp it covers; the next chunk is
//! seeded with an overlap window taken from the tail of the previous one,
//! preferring to start at a sentence boundary.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Chunk, SourceType, TimeRange};

use super::{chunk_document, snap_to_char_boundary, ChunkingConfig};

/// How far past the overlap start to scan for a sentence boundary when
/// seeding the next chunk's overlap window.
const SENTENCE_SCAN_RANGE: usize = 100;

/// Utterances shorter than this (after trimming) are dropped as noise.
const MIN_UTTERANCE_LEN: usize = 10;

static TURN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,2}:\d{2})\]\s*([^:\[\]\n]+):\s*([^\[]*)").expect("turn regex"));

/// Content-free acknowledgements filtered out of transcripts. Matched
/// case-insensitively against the whole trimmed utterance, with an
/// optional trailing period.
const BOILERPLATE: &[&str] = &[
    "thank you", "thanks", "ok", "okay", "yes", "no", "mhm", "uh-huh", "right",
];

#[derive(Debug)]
struct Turn {
    timestamp: String,
    speaker: String,
    full_text: String,
}

fn is_boilerplate(text: &str) -> bool {
    let trimmed = text.trim().trim_end_matches('.').to_lowercase();
    BOILERPLATE.contains(&trimmed.as_str())
}

/// Parse transcript turns in a single pass over the content.
///
/// Turns with utterances shorter than [`MIN_UTTERANCE_LEN`] or matching
/// the boilerplate list are skipped.
fn parse_turns(content: &str) -> Vec<Turn> {
    TURN_RE
        .captures_iter(content)
        .filter_map(|caps| {
            let timestamp = caps[1].to_string();
            let speaker = caps[2].trim().to_string();
            let text = caps[3].trim();
            if text.len() < MIN_UTTERANCE_LEN || is_boilerplate(text) {
                return None;
            }
            Some(Turn {
                full_text: format!("[{timestamp}] {speaker}: {text}"),
                timestamp,
                speaker,
            })
        })
        .collect()
}

/// Chunk a transcript with speaker awareness.
///
/// Falls back to plain-document chunking when no turns parse (the
/// classifier is a heuristic and can misfire on bracketed prose).
pub fn chunk_transcript(content: &str, source_key: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let turns = parse_turns(content);
    if turns.is_empty() {
        return chunk_document(content, source_key, SourceType::File, config);
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current = String::new();
    let mut speakers: Vec<String> = Vec::new();
    let mut start_ts = String::new();
    let mut end_ts = String::new();

    for turn in &turns {
        let turn_text = format!("{}\n\n", turn.full_text);

        if current.len() + turn_text.len() > config.max_size() && current.len() >= config.min_size()
        {
            chunks.push(transcript_chunk(
                &current,
                chunks.len(),
                source_key,
                &speakers,
                &start_ts,
                &end_ts,
            ));

            let mut seeded = overlap_text(&current, config.overlap()).to_string();
            seeded.push_str(&turn_text);
            current = seeded;
            speakers = vec![turn.speaker.clone()];
            start_ts = turn.timestamp.clone();
            end_ts = turn.timestamp.clone();
        } else {
            current.push_str(&turn_text);
            if !speakers.contains(&turn.speaker) {
                speakers.push(turn.speaker.clone());
            }
            if start_ts.is_empty() {
                start_ts = turn.timestamp.clone();
            }
            end_ts = turn.timestamp.clone();
        }
    }

    if current.len() >= config.min_size() / 2 {
        chunks.push(transcript_chunk(
            &current,
            chunks.len(),
            source_key,
            &speakers,
            &start_ts,
            &end_ts,
        ));
    }

    chunks
}

fn transcript_chunk(
    text: &str,
    index: usize,
    source_key: &str,
    speakers: &[String],
    start_ts: &str,
    end_ts: &str,
) -> Chunk {
    let text = text.trim();
    Chunk {
        text: text.to_string(),
        index,
        source_type: SourceType::Transcript,
        source_key: source_key.to_string(),
        size: text.len(),
        speakers: speakers.to_vec(),
        time_range: Some(TimeRange {
            start: start_ts.to_string(),
            end: end_ts.to_string(),
        }),
        is_transcript: true,
    }
}

/// Take the overlap window from the end of a closed chunk, preferring to
/// start at a sentence boundary found within [`SENTENCE_SCAN_RANGE`]
/// bytes past the nominal overlap start.
fn overlap_text(text: &str, overlap: usize) -> &str {
    if text.len() <= overlap {
        return text;
    }

    let overlap_start = text.len() - overlap;
    let scan_end = snap_to_char_boundary(text, (overlap_start + SENTENCE_SCAN_RANGE).min(text.len()));
    if let Some(pos) = text[..scan_end].rfind(". ") {
        if pos > overlap_start {
            return &text[pos + 2..];
        }
    }

    &text[snap_to_char_boundary(text, overlap_start)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::is_transcript;

    fn sample_transcript(turns: usize) -> String {
        let speakers = ["ann", "bob", "carol"];
        (0..turns)
            .map(|i| {
                format!(
                    "[{}:{:02}] {}: This is utterance number {} with plenty of substance to discuss. \
                     We went over the roadmap and agreed on the next milestone for the quarter.",
                    9 + i / 60,
                    i % 60,
                    speakers[i % speakers.len()],
                    i
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn parses_turns_and_filters_noise() {
        let content = "[9:00] ann: Let's review the incident timeline from last Tuesday in detail.\n\
                       [9:01] bob: ok\n\
                       [9:02] carol: Thanks.\n\
                       [9:03] bob: mhm\n\
                       [9:04] ann: The rollback finished at nine and traffic recovered within minutes.";
        let turns = parse_turns(content);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, "ann");
        assert_eq!(turns[1].timestamp, "9:04");
    }

    #[test]
    fn boilerplate_matching_is_exact_and_case_insensitive() {
        assert!(is_boilerplate("OK"));
        assert!(is_boilerplate("Thanks."));
        assert!(is_boilerplate("uh-huh"));
        assert!(!is_boilerplate("okay, but we still need a decision"));
    }

    #[test]
    fn every_chunk_has_speakers_and_ordered_time_range() {
        let content = sample_transcript(120);
        assert!(is_transcript(&content));
        let chunks = chunk_transcript(&content, "meeting-42", &ChunkingConfig::transcript());
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.is_transcript);
            assert!(!c.speakers.is_empty());
            let range = c.time_range.as_ref().expect("transcript chunk time range");
            let minutes = |t: &str| -> u32 {
                let (h, m) = t.split_once(':').unwrap();
                h.parse::<u32>().unwrap() * 60 + m.parse::<u32>().unwrap()
            };
            assert!(minutes(&range.start) <= minutes(&range.end), "range in {range:?}");
        }
    }

    #[test]
    fn chunks_stay_within_max_size() {
        let content = sample_transcript(200);
        let config = ChunkingConfig::transcript();
        let chunks = chunk_transcript(&content, "m", &config);
        for c in &chunks {
            assert!(c.size <= config.max_size() + config.overlap());
        }
    }

    #[test]
    fn speakers_are_distinct_and_first_seen_ordered() {
        let content = "[9:00] bob: We kicked off the migration runbook walkthrough this morning.\n\
                       [9:01] ann: The schema change needs a second reviewer before Thursday.\n\
                       [9:02] bob: Agreed, I'll ask the storage folks to take a detailed look.";
        let config = ChunkingConfig::new(1000, 400, 1200, 100).unwrap();
        let chunks = chunk_transcript(content, "m", &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].speakers, vec!["bob", "ann"]);
    }

    #[test]
    fn overlap_window_prefers_sentence_boundary() {
        let text = format!("{}. {}", "a".repeat(400), "b".repeat(200));
        // overlap start = len − 300 = 302, inside the a-run; the ". " at
        // 400 lies within the scan range, so the overlap starts after it.
        let seeded = overlap_text(&text, 300);
        assert!(seeded.starts_with('b'));
        assert_eq!(seeded.len(), 200);
    }

    #[test]
    fn overlap_window_falls_back_to_raw_tail() {
        let text = "c".repeat(800);
        let seeded = overlap_text(&text, 300);
        assert_eq!(seeded.len(), 300);
    }

    #[test]
    fn unparseable_transcript_falls_back_to_document_policy() {
        let content = "[9:00] [9:05] [9:10] bracketed markers without any speaker turns. "
            .repeat(40);
        let chunks = chunk_transcript(&content, "m", &ChunkingConfig::transcript());
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| !c.is_transcript));
    }
}
