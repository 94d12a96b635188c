//! Rank fusion for hybrid retrieval.
//!
//! Keyword and vector result lists are merged into a single ranking. Three
//! strategies are supported:
//!
//! - **RRF** (reciprocal rank fusion): each appearance contributes its
//!   side's weight times `1 / (k + rank)` with `k = 60`; contributions for
//!   the same record sum.
//! - **Weighted**: each list's ranks are normalized to `1 - rank/total`,
//!   then combined as `fts_weight * kw_norm + semantic_weight * vec_norm`.
//! - **Max**: keyword side normalized as in weighted, semantic side uses
//!   the raw similarity; the combined score is the larger weighted side.
//!
//! # Determinism
//!
//! The fusion map preserves insertion order: keyword hits enter first (in
//! rank order), then vector hits. Ties in the combined score are broken by
//! that insertion order via a stable sort, so a given pair of input lists
//! always produces the same ranking.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::{KeywordHit, VectorHit};

/// Reciprocal-rank-fusion constant. Dampens the influence of top ranks so
/// mid-list agreement between sources still counts.
pub const RRF_K: f64 = 60.0;

/// Bytes of chunk text carried into the snippet for vector-only results.
const SNIPPET_LEN: usize = 200;

/// How the two result lists are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionStrategy {
    #[default]
    Rrf,
    Weighted,
    Max,
}

impl FromStr for FusionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rrf" => Ok(FusionStrategy::Rrf),
            "weighted" => Ok(FusionStrategy::Weighted),
            "max" => Ok(FusionStrategy::Max),
            other => Err(format!("unknown fusion strategy: {other}")),
        }
    }
}

/// A merged search result with per-source and combined scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    /// `{source}:{native_key}` — globally unique across backends.
    pub key: String,
    pub source: String,
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub speakers: Vec<String>,
    pub combined_score: f64,
    /// Raw keyword relevance, when the record matched the keyword side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    /// Cosine similarity, when the record matched the vector side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f64>,
}

/// Build the global fusion key for a record.
pub fn fusion_key(source: &str, native_key: &str) -> String {
    format!("{source}:{native_key}")
}

struct Entry {
    result: FusedResult,
    insertion: usize,
}

/// Merge keyword and vector hits into a single ranked list.
///
/// Both input lists are assumed to be in rank order (best first). Returns
/// at most `limit` results, sorted by combined score descending with ties
/// broken by insertion order (keyword hits first).
pub fn fuse(
    keyword: &[KeywordHit],
    vector: &[VectorHit],
    strategy: FusionStrategy,
    fts_weight: f64,
    semantic_weight: f64,
    limit: usize,
) -> Vec<FusedResult> {
    let mut order: Vec<String> = Vec::new();
    let mut entries: HashMap<String, Entry> = HashMap::new();

    for (rank, hit) in keyword.iter().enumerate() {
        let key = hit.key();
        let contribution = match strategy {
            FusionStrategy::Rrf => fts_weight / (RRF_K + rank as f64),
            FusionStrategy::Weighted | FusionStrategy::Max => {
                fts_weight * (1.0 - rank as f64 / keyword.len() as f64)
            }
        };
        let next_insertion = entries.len();
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Entry {
                result: FusedResult {
                    key: fusion_key(&hit.source, &hit.native_key),
                    source: hit.source.clone(),
                    title: hit.title.clone(),
                    snippet: hit.snippet.clone(),
                    area: hit.area.clone(),
                    category: hit.category.clone(),
                    speakers: Vec::new(),
                    combined_score: 0.0,
                    keyword_score: None,
                    semantic_score: None,
                },
                insertion: next_insertion,
            }
        });
        entry.result.combined_score += contribution;
        entry.result.keyword_score = Some(hit.score);
    }

    for (rank, hit) in vector.iter().enumerate() {
        let key = hit.key();
        let contribution = match strategy {
            FusionStrategy::Rrf => semantic_weight / (RRF_K + rank as f64),
            FusionStrategy::Weighted => {
                semantic_weight * (1.0 - rank as f64 / vector.len() as f64)
            }
            FusionStrategy::Max => semantic_weight * hit.similarity,
        };
        let next_insertion = entries.len();
        let entry = entries.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Entry {
                result: FusedResult {
                    key: fusion_key(&hit.source, &hit.native_key),
                    source: hit.source.clone(),
                    title: hit.title.clone(),
                    snippet: snippet_of(&hit.chunk_text),
                    area: hit.area.clone(),
                    category: hit.category.clone(),
                    speakers: Vec::new(),
                    combined_score: 0.0,
                    keyword_score: None,
                    semantic_score: None,
                },
                insertion: next_insertion,
            }
        });
        match strategy {
            FusionStrategy::Max => {
                entry.result.combined_score = entry.result.combined_score.max(contribution);
            }
            _ => entry.result.combined_score += contribution,
        }
        entry.result.semantic_score = Some(hit.similarity);
        if entry.result.speakers.is_empty() {
            entry.result.speakers = hit.speakers.clone();
        }
    }

    let mut fused: Vec<Entry> = order
        .into_iter()
        .filter_map(|key| entries.remove(&key))
        .collect();
    fused.sort_by(|a, b| {
        b.result
            .combined_score
            .partial_cmp(&a.result.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.insertion.cmp(&b.insertion))
    });
    fused.truncate(limit);
    fused.into_iter().map(|e| e.result).collect()
}

fn snippet_of(chunk_text: &str) -> String {
    if chunk_text.len() <= SNIPPET_LEN {
        return chunk_text.to_string();
    }
    let mut end = SNIPPET_LEN;
    while !chunk_text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &chunk_text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(native_key: &str, score: f64) -> KeywordHit {
        KeywordHit {
            source: "file".to_string(),
            native_key: native_key.to_string(),
            title: native_key.to_string(),
            snippet: format!("snippet for {native_key}"),
            area: None,
            category: None,
            score,
        }
    }

    fn vec_hit(native_key: &str, similarity: f64) -> VectorHit {
        VectorHit {
            source: "file".to_string(),
            native_key: native_key.to_string(),
            title: native_key.to_string(),
            chunk_text: format!("chunk text for {native_key}"),
            area: None,
            category: None,
            speakers: Vec::new(),
            similarity,
        }
    }

    #[test]
    fn rrf_sums_weighted_contributions_from_both_sides() {
        let keyword = vec![kw("a", 3.0), kw("b", 2.0)];
        let vector = vec![vec_hit("b", 0.9), vec_hit("c", 0.8)];
        let results = fuse(&keyword, &vector, FusionStrategy::Rrf, 0.5, 0.5, 10);

        assert_eq!(results[0].key, "file:b");
        // b: keyword rank 1 + vector rank 0
        let expected = 0.5 / 61.0 + 0.5 / 60.0;
        assert!((results[0].combined_score - expected).abs() < 1e-12);
        assert_eq!(results[0].keyword_score, Some(2.0));
        assert_eq!(results[0].semantic_score, Some(0.9));
    }

    #[test]
    fn rrf_ties_break_by_insertion_order() {
        // a (keyword rank 1) and c (vector rank 1) both score 0.5/61; the
        // keyword hit was inserted first and must stay ahead.
        let keyword = vec![kw("b", 2.0), kw("a", 1.0)];
        let vector = vec![vec_hit("b", 0.9), vec_hit("c", 0.8)];
        let results = fuse(&keyword, &vector, FusionStrategy::Rrf, 0.5, 0.5, 10);

        // b: 0.5/60 + 0.5/60 = 1/60, first
        assert!((results[0].combined_score - 1.0 / 60.0).abs() < 1e-12);
        assert!(
            (results[1].combined_score - results[2].combined_score).abs() < 1e-12,
            "a and c should tie"
        );
        let keys: Vec<&str> = results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["file:b", "file:a", "file:c"]);
    }

    #[test]
    fn weighted_normalizes_ranks_on_both_sides() {
        let keyword = vec![kw("a", 9.0), kw("b", 5.0)];
        let vector = vec![vec_hit("a", 0.5)];
        let results = fuse(&keyword, &vector, FusionStrategy::Weighted, 0.4, 0.6, 10);

        // a: 0.4 * (1 - 0/2) + 0.6 * (1 - 0/1) = 1.0
        assert_eq!(results[0].key, "file:a");
        assert!((results[0].combined_score - 1.0).abs() < 1e-12);
        // b: 0.4 * (1 - 1/2) = 0.2
        assert!((results[1].combined_score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn max_takes_the_stronger_side() {
        let keyword = vec![kw("a", 9.0)];
        let vector = vec![vec_hit("a", 0.9)];
        let results = fuse(&keyword, &vector, FusionStrategy::Max, 0.4, 0.6, 10);

        // max(0.4 * 1.0, 0.6 * 0.9) = 0.54
        assert!((results[0].combined_score - 0.54).abs() < 1e-12);
    }

    #[test]
    fn keyword_payload_wins_for_shared_records() {
        let keyword = vec![kw("a", 2.0)];
        let mut v = vec_hit("a", 0.8);
        v.chunk_text = "vector side text that should not become the snippet".to_string();
        let results = fuse(&keyword, &[v], FusionStrategy::Rrf, 0.5, 0.5, 10);

        assert_eq!(results[0].snippet, "snippet for a");
    }

    #[test]
    fn vector_only_snippet_is_truncated_chunk_text() {
        let mut v = vec_hit("a", 0.8);
        v.chunk_text = "x".repeat(500);
        let results = fuse(&[], &[v], FusionStrategy::Rrf, 0.5, 0.5, 10);

        assert_eq!(results[0].snippet.chars().count(), 201);
        assert!(results[0].snippet.ends_with('…'));
    }

    #[test]
    fn vector_speakers_are_carried() {
        let mut v = vec_hit("m", 0.7);
        v.speakers = vec!["ann".to_string(), "bob".to_string()];
        let results = fuse(&[], &[v], FusionStrategy::Rrf, 0.5, 0.5, 10);
        assert_eq!(results[0].speakers, vec!["ann", "bob"]);
    }

    #[test]
    fn limit_truncates_after_sorting() {
        let keyword: Vec<_> = (0..10).map(|i| kw(&format!("k{i}"), 1.0)).collect();
        let results = fuse(&keyword, &[], FusionStrategy::Rrf, 0.5, 0.5, 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].key, "file:k0");
    }

    #[test]
    fn same_native_key_from_different_sources_stays_distinct() {
        let keyword = vec![KeywordHit {
            source: "email".to_string(),
            ..kw("x", 1.0)
        }];
        let vector = vec![vec_hit("x", 0.9)];
        let results = fuse(&keyword, &vector, FusionStrategy::Rrf, 0.5, 0.5, 10);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn strategy_parses_from_str() {
        assert_eq!("rrf".parse::<FusionStrategy>(), Ok(FusionStrategy::Rrf));
        assert_eq!("max".parse::<FusionStrategy>(), Ok(FusionStrategy::Max));
        assert!("bm25".parse::<FusionStrategy>().is_err());
    }
}
