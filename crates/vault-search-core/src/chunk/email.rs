//! Email chunking: signature stripping plus plain-document windowing.
//!
//! Email bodies are noisy at the tail: signature delimiters, mobile-client
//! footers, and legal disclaimers. The body is truncated at the earliest
//! signature marker, prefixed with its subject line, and then chunked with
//! the document policy.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Chunk, EmailMessage, SourceType};

use super::{chunk_document, ChunkingConfig};

/// Markers that begin signature or footer material. The body is cut at the
/// earliest match across all patterns.
static SIGNATURE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?m)^--\s*$",
        r"(?m)^Sent from my iPhone",
        r"(?m)^Sent from my iPad",
        r"(?m)^Get Outlook for",
        r"(?mi)^\[?disclaimer:?\]?",
        r"(?mi)^this email and any attachments",
        r"(?mi)^confidential",
        r"(?m)^_{10,}$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("signature regex"))
    .collect()
});

/// Remove signature and footer material from an email body.
///
/// Truncates at the earliest match of any signature marker; returns the
/// trimmed remainder (the whole trimmed body when nothing matches).
pub fn strip_signature(body: &str) -> &str {
    let cut = SIGNATURE_RES
        .iter()
        .filter_map(|re| re.find(body).map(|m| m.start()))
        .min()
        .unwrap_or(body.len());
    body[..cut].trim()
}

/// Chunk an email.
///
/// The embedded text is `Subject: <subject>` followed by a blank line and
/// the signature-stripped body, so subject terms stay searchable in every
/// chunk lookup. An empty subject is rendered as `(No Subject)`.
pub fn chunk_email(email: &EmailMessage, source_key: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let subject = if email.subject.trim().is_empty() {
        "(No Subject)"
    } else {
        email.subject.trim()
    };
    let cleaned = strip_signature(&email.body);
    let content = format!("Subject: {subject}\n\n{cleaned}");
    chunk_document(&content, source_key, SourceType::Email, config)
}
