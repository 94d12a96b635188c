//! Hybrid retrieval engine.
//!
//! A query fans out to the keyword backend and (after embedding the query)
//! the vector backend concurrently; both result lists are merged by rank
//! fusion. Each side over-fetches three times the requested limit so the
//! fused ranking has enough overlap to work with.
//!
//! # Degradation
//!
//! If exactly one side fails — including the embedding call, which counts
//! against the vector side — the search still returns the surviving
//! side's results, with the failure recorded in the report and logged.
//! Only when both sides fail does the search error out.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use vault_search_core::fusion::{fuse, FusedResult, FusionStrategy};
use vault_search_core::store::{KeywordIndex, SearchFilters, VectorHit, VectorIndex};

use crate::config::RetrievalConfig;
use crate::embedding::QueryEmbedder;

/// Both sides over-fetch this multiple of the requested limit.
const FETCH_MULTIPLIER: usize = 3;

/// Per-search knobs. [`SearchOptions::default`] mirrors the configuration
/// defaults.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub fts_weight: f64,
    pub semantic_weight: f64,
    pub strategy: FusionStrategy,
    /// Minimum cosine similarity for vector hits.
    pub similarity_threshold: f32,
    pub filters: SearchFilters,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for SearchOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            limit: config.limit,
            fts_weight: config.fts_weight,
            semantic_weight: config.semantic_weight,
            strategy: config.strategy,
            similarity_threshold: config.similarity_threshold,
            filters: SearchFilters::default(),
        }
    }
}

impl SearchOptions {
    fn validate(&self) -> Result<(), SearchError> {
        if self.limit == 0 {
            return Err(SearchError::InvalidOptions("limit must be positive".into()));
        }
        for (name, w) in [
            ("fts_weight", self.fts_weight),
            ("semantic_weight", self.semantic_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(SearchError::InvalidOptions(format!(
                    "{name} must be within [0, 1], got {w}"
                )));
            }
        }
        if self.fts_weight + self.semantic_weight > 1.0 + 1e-9 {
            return Err(SearchError::InvalidOptions(format!(
                "weights must sum to at most 1, got {}",
                self.fts_weight + self.semantic_weight
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SearchError::InvalidOptions(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search options: {0}")]
    InvalidOptions(String),
    /// Both retrieval sides failed; nothing can be returned.
    #[error("all search sources failed (keyword: {keyword}; vector: {vector})")]
    AllSourcesFailed { keyword: String, vector: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Which retrieval side dropped out of a degraded search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradedSide {
    Keyword,
    Vector,
}

/// Record of a side that failed during an otherwise successful search.
#[derive(Debug, Clone, Serialize)]
pub struct Degradation {
    pub side: DegradedSide,
    pub reason: String,
}

/// A completed search: fused results plus an optional degradation note.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub results: Vec<FusedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
}

impl SearchReport {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            degraded: None,
        }
    }
}

/// A fused result annotated with why it matched.
#[derive(Debug, Clone, Serialize)]
pub struct Explained {
    #[serde(flatten)]
    pub result: FusedResult,
    pub reason: String,
}

/// The hybrid retrieval engine. Cheap to clone; clones share backends.
#[derive(Clone)]
pub struct HybridEngine {
    keyword: Arc<dyn KeywordIndex>,
    vector: Arc<dyn VectorIndex>,
    embedder: Arc<dyn QueryEmbedder>,
}

impl HybridEngine {
    pub fn new(
        keyword: Arc<dyn KeywordIndex>,
        vector: Arc<dyn VectorIndex>,
        embedder: Arc<dyn QueryEmbedder>,
    ) -> Self {
        Self {
            keyword,
            vector,
            embedder,
        }
    }

    /// Run a hybrid search.
    ///
    /// An empty or all-whitespace query returns an empty report without
    /// touching either backend.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidOptions`] for bad options and
    /// [`SearchError::AllSourcesFailed`] when neither side produced
    /// results.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchReport, SearchError> {
        options.validate()?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchReport::empty());
        }

        let fetch_limit = options.limit * FETCH_MULTIPLIER;
        let (keyword_out, vector_out) = tokio::join!(
            self.keyword.keyword_search(query, &options.filters, fetch_limit),
            self.vector_side(query, options, fetch_limit),
        );

        let (keyword_hits, vector_hits, degraded) = match (keyword_out, vector_out) {
            (Ok(kw), Ok(vs)) => (kw, vs, None),
            (Ok(kw), Err(reason)) => {
                warn!(%query, %reason, "vector side failed, degrading to keyword-only");
                let degraded = Degradation {
                    side: DegradedSide::Vector,
                    reason,
                };
                (kw, Vec::new(), Some(degraded))
            }
            (Err(err), Ok(vs)) => {
                warn!(%query, error = %err, "keyword side failed, degrading to semantic-only");
                let degraded = Degradation {
                    side: DegradedSide::Keyword,
                    reason: err.to_string(),
                };
                (Vec::new(), vs, Some(degraded))
            }
            (Err(kw_err), Err(vec_reason)) => {
                return Err(SearchError::AllSourcesFailed {
                    keyword: kw_err.to_string(),
                    vector: vec_reason,
                });
            }
        };

        debug!(
            %query,
            keyword_hits = keyword_hits.len(),
            vector_hits = vector_hits.len(),
            "fusing results"
        );
        let results = fuse(
            &keyword_hits,
            &vector_hits,
            options.strategy,
            options.fts_weight,
            options.semantic_weight,
            options.limit,
        );
        Ok(SearchReport { results, degraded })
    }

    /// Embed the query, then run the vector backend. An embedding failure
    /// is reported as a vector-side failure.
    async fn vector_side(
        &self,
        query: &str,
        options: &SearchOptions,
        fetch_limit: usize,
    ) -> Result<Vec<VectorHit>, String> {
        let query_vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| format!("query embedding failed: {e}"))?;
        self.vector
            .vector_search(
                &query_vector,
                &options.filters,
                fetch_limit,
                options.similarity_threshold,
            )
            .await
            .map_err(|e| e.to_string())
    }

    /// Run a hybrid search and annotate each result with the reason it
    /// matched.
    ///
    /// # Errors
    ///
    /// Same as [`HybridEngine::search`].
    pub async fn explain(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Explained>, SearchError> {
        let report = self.search(query, options).await?;
        Ok(report
            .results
            .into_iter()
            .map(|result| {
                let reason = match (&result.keyword_score, &result.semantic_score) {
                    (Some(_), Some(_)) => "Matched both keyword and semantic search",
                    (Some(_), None) => "Matched keyword search only (exact terms found)",
                    (None, Some(_)) => "Matched semantic search only (conceptually similar)",
                    (None, None) => "Matched neither source",
                }
                .to_string();
                Explained { result, reason }
            })
            .collect())
    }

    /// Search several query phrasings and merge the rankings.
    ///
    /// Each query runs with a reduced per-query limit; a record hit by
    /// several queries keeps its best combined score. Results come back in
    /// score order, ties broken by the order of the query that first
    /// found them.
    ///
    /// # Errors
    ///
    /// Fails if any individual search fails.
    pub async fn multi_query(
        &self,
        queries: &[String],
        options: &SearchOptions,
    ) -> Result<SearchReport, SearchError> {
        options.validate()?;
        let queries: Vec<String> = queries
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            return Ok(SearchReport::empty());
        }

        let per_query = SearchOptions {
            limit: options.limit.div_ceil(queries.len()) * 2,
            ..options.clone()
        };

        let mut set: JoinSet<(usize, Result<SearchReport, SearchError>)> = JoinSet::new();
        for (i, query) in queries.iter().enumerate() {
            let engine = self.clone();
            let query = query.clone();
            let per_query = per_query.clone();
            set.spawn(async move {
                let out = engine.search(&query, &per_query).await;
                (i, out)
            });
        }

        let mut reports: Vec<Option<SearchReport>> = (0..queries.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (i, out) =
                joined.map_err(|e| anyhow::anyhow!("search task aborted: {e}"))?;
            reports[i] = Some(out?);
        }

        // Merge in query order so ties stay deterministic.
        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, FusedResult> = HashMap::new();
        let mut degraded: Option<Degradation> = None;
        for report in reports.into_iter().flatten() {
            if degraded.is_none() {
                degraded = report.degraded;
            }
            for result in report.results {
                match merged.get_mut(&result.key) {
                    Some(existing) => {
                        if result.combined_score > existing.combined_score {
                            *existing = result;
                        }
                    }
                    None => {
                        order.push(result.key.clone());
                        merged.insert(result.key.clone(), result);
                    }
                }
            }
        }

        let mut results: Vec<FusedResult> = order
            .into_iter()
            .filter_map(|key| merged.remove(&key))
            .collect();
        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(options.limit);
        Ok(SearchReport { results, degraded })
    }
}
