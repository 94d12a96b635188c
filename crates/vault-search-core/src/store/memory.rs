//! In-memory search backend.
//!
//! Reference implementation of both backend traits, used by tests and by
//! small corpora that fit in memory. Keyword scoring is term-frequency
//! counting; vector scoring is brute-force cosine similarity.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::SourceType;

use super::{KeywordHit, KeywordIndex, SearchFilters, VectorHit, VectorIndex};

const SNIPPET_LEN: usize = 240;

/// A record registered with the in-memory index. One entry per chunk.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub source: SourceType,
    pub native_key: String,
    pub title: String,
    pub text: String,
    pub area: Option<String>,
    pub category: Option<String>,
    pub speakers: Vec<String>,
    /// Precomputed embedding; entries without one are invisible to
    /// vector search.
    pub vector: Option<Vec<f32>>,
}

/// Thread-safe in-memory implementation of both search backends.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: MemoryEntry) {
        self.entries.write().unwrap().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches_filters(entry: &MemoryEntry, filters: &SearchFilters) -> bool {
        if let Some(sources) = &filters.sources {
            if !sources.contains(&entry.source) {
                return false;
            }
        }
        if let Some(area) = &filters.area {
            if entry.area.as_deref() != Some(area.as_str()) {
                return false;
            }
        }
        if let Some(speaker) = &filters.speaker {
            if !entry.speakers.iter().any(|s| s == speaker) {
                return false;
            }
        }
        if let Some(prefix) = &filters.path_prefix {
            if entry.source == SourceType::File && !entry.native_key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Count how many times the query terms occur across title and text.
fn term_count(entry: &MemoryEntry, terms: &[String]) -> usize {
    let haystack = format!("{} {}", entry.title, entry.text).to_lowercase();
    terms
        .iter()
        .map(|term| haystack.matches(term.as_str()).count())
        .sum()
}

fn snippet_of(text: &str) -> String {
    if text.len() <= SNIPPET_LEN {
        return text.to_string();
    }
    let mut end = SNIPPET_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl KeywordIndex for MemoryIndex {
    async fn keyword_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> anyhow::Result<Vec<KeywordHit>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().unwrap();
        let mut hits: Vec<KeywordHit> = entries
            .iter()
            .filter(|e| Self::matches_filters(e, filters))
            .filter_map(|e| {
                let count = term_count(e, &terms);
                if count == 0 {
                    return None;
                }
                Some(KeywordHit {
                    source: e.source.to_string(),
                    native_key: e.native_key.clone(),
                    title: e.title.clone(),
                    snippet: snippet_of(&e.text),
                    area: e.area.clone(),
                    category: e.category.clone(),
                    score: count as f64,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn vector_search(
        &self,
        query_vector: &[f32],
        filters: &SearchFilters,
        limit: usize,
        threshold: f32,
    ) -> anyhow::Result<Vec<VectorHit>> {
        let entries = self.entries.read().unwrap();
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .filter(|e| Self::matches_filters(e, filters))
            .filter_map(|e| {
                let vector = e.vector.as_ref()?;
                let similarity = cosine_sim(query_vector, vector);
                if similarity < f64::from(threshold) {
                    return None;
                }
                Some(VectorHit {
                    source: e.source.to_string(),
                    native_key: e.native_key.clone(),
                    title: e.title.clone(),
                    chunk_text: e.text.clone(),
                    area: e.area.clone(),
                    category: e.category.clone(),
                    speakers: e.speakers.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(native_key: &str, text: &str, vector: Option<Vec<f32>>) -> MemoryEntry {
        MemoryEntry {
            source: SourceType::File,
            native_key: native_key.to_string(),
            title: native_key.to_string(),
            text: text.to_string(),
            area: None,
            category: None,
            speakers: Vec::new(),
            vector,
        }
    }

    #[tokio::test]
    async fn keyword_search_ranks_by_term_frequency() {
        let index = MemoryIndex::new();
        index.insert(entry("a.md", "deploy notes, deploy checklist, deploy log", None));
        index.insert(entry("b.md", "one mention of deploy", None));
        index.insert(entry("c.md", "nothing relevant here", None));

        let hits = index
            .keyword_search("deploy", &SearchFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].native_key, "a.md");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn keyword_search_is_case_insensitive() {
        let index = MemoryIndex::new();
        index.insert(entry("a.md", "The Deploy went FINE", None));
        let hits = index
            .keyword_search("deploy fine", &SearchFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 2.0);
    }

    #[tokio::test]
    async fn vector_search_threshold_is_inclusive() {
        let index = MemoryIndex::new();
        // Unit basis vector against itself: cosine similarity is exactly 1.0.
        index.insert(entry("exact", "identical direction", Some(vec![1.0, 0.0])));

        let hits = index
            .vector_search(&[1.0, 0.0], &SearchFilters::default(), 10, 1.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1, "hit at exactly the threshold must be kept");
        assert_eq!(hits[0].native_key, "exact");
    }

    #[tokio::test]
    async fn vector_search_respects_threshold() {
        let index = MemoryIndex::new();
        index.insert(entry("near", "close match", Some(vec![1.0, 0.0])));
        index.insert(entry("far", "orthogonal", Some(vec![0.0, 1.0])));
        index.insert(entry("unembedded", "no vector", None));

        let hits = index
            .vector_search(&[1.0, 0.0], &SearchFilters::default(), 10, 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].native_key, "near");
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn filters_restrict_both_sides() {
        let index = MemoryIndex::new();
        index.insert(MemoryEntry {
            source: SourceType::Email,
            area: Some("eng".to_string()),
            ..entry("mail-1", "deploy schedule update", Some(vec![1.0, 0.0]))
        });
        index.insert(entry("notes/a.md", "deploy schedule update", Some(vec![1.0, 0.0])));

        let filters = SearchFilters {
            sources: Some(vec![SourceType::Email]),
            ..Default::default()
        };
        let hits = index.keyword_search("deploy", &filters, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "email");

        let filters = SearchFilters {
            path_prefix: Some("notes/".to_string()),
            ..Default::default()
        };
        let hits = index
            .vector_search(&[1.0, 0.0], &filters, 10, 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        // The email entry is not a file, so the path prefix does not
        // exclude it.
        assert!(hits.iter().any(|h| h.native_key == "mail-1"));
        assert!(hits.iter().any(|h| h.native_key == "notes/a.md"));
    }

    #[tokio::test]
    async fn speaker_filter_matches_exactly() {
        let index = MemoryIndex::new();
        index.insert(MemoryEntry {
            source: SourceType::Transcript,
            speakers: vec!["ann".to_string(), "bob".to_string()],
            ..entry("m-1", "quarterly planning recap", None)
        });
        let filters = SearchFilters {
            speaker: Some("carol".to_string()),
            ..Default::default()
        };
        let hits = index.keyword_search("planning", &filters, 10).await.unwrap();
        assert!(hits.is_empty());

        let filters = SearchFilters {
            speaker: Some("bob".to_string()),
            ..Default::default()
        };
        let hits = index.keyword_search("planning", &filters, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
