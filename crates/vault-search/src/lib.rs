//! # Vault Search
//!
//! Hybrid retrieval over a personal knowledge vault: lexical keyword
//! search and embedding-based semantic search run in parallel and are
//! merged by rank fusion.
//!
//! The crate wires three pieces together:
//!
//! - [`config`]: TOML configuration with environment-friendly defaults.
//! - [`embedding`]: HTTP client for a local embedding service, with
//!   ordered batching and bounded-concurrency parallel embedding.
//! - [`search`]: the [`search::HybridEngine`] that fans a query out to
//!   both backends, fuses the results, and degrades gracefully when one
//!   side fails.
//!
//! Pure logic (chunking, fusion, backend traits) lives in
//! [`vault_search_core`].

pub mod config;
pub mod embedding;
pub mod search;

pub use config::{
    load_config, ChunkingProfilesConfig, Config, EmbeddingConfig, RetrievalConfig,
};
pub use embedding::{EmbedClient, EmbedError, QueryEmbedder};
pub use search::{HybridEngine, SearchError, SearchOptions, SearchReport};
