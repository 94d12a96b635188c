//! Search backend contracts.
//!
//! The retrieval engine talks to storage through two narrow async traits:
//! [`KeywordIndex`] for lexical full-text lookup and [`VectorIndex`] for
//! similarity lookup over precomputed embeddings. Backends return plain
//! hit structs; scoring normalization and fusion happen above them.

pub mod memory;

pub use memory::MemoryIndex;

use async_trait::async_trait;

use crate::fusion::fusion_key;
use crate::models::SourceType;

/// Filters applied by both backends before scoring.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict to these source types; `None` means all.
    pub sources: Option<Vec<SourceType>>,
    pub area: Option<String>,
    pub speaker: Option<String>,
    /// Restrict file results to keys under this prefix.
    pub path_prefix: Option<String>,
}

/// One lexical match, in backend-native score units.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub source: String,
    /// Backend-native record identifier (file path, email hash, ...).
    pub native_key: String,
    pub title: String,
    pub snippet: String,
    pub area: Option<String>,
    pub category: Option<String>,
    /// Backend-native relevance; only comparable within one result list.
    pub score: f64,
}

impl KeywordHit {
    pub fn key(&self) -> String {
        fusion_key(&self.source, &self.native_key)
    }
}

/// One similarity match over chunk embeddings.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub source: String,
    pub native_key: String,
    pub title: String,
    /// Full text of the matched chunk.
    pub chunk_text: String,
    pub area: Option<String>,
    pub category: Option<String>,
    pub speakers: Vec<String>,
    /// Cosine similarity in `[-1, 1]`; backends only return hits at or
    /// above the caller's threshold.
    pub similarity: f64,
}

impl VectorHit {
    pub fn key(&self) -> String {
        fusion_key(&self.source, &self.native_key)
    }
}

/// Lexical full-text search over indexed records.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Find records matching `query`, best first, at most `limit` hits.
    async fn keyword_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> anyhow::Result<Vec<KeywordHit>>;
}

/// Similarity search over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Find chunks whose similarity to `query_vector` meets or exceeds
    /// `threshold`, best first, at most `limit` hits.
    async fn vector_search(
        &self,
        query_vector: &[f32],
        filters: &SearchFilters,
        limit: usize,
        threshold: f32,
    ) -> anyhow::Result<Vec<VectorHit>>;
}
