//! TOML configuration.
//!
//! Every field has a default aimed at a local single-user setup, so an
//! empty file (or no file at all) yields a working configuration. Values
//! are validated once at load time.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use vault_search_core::chunk::{ChatChunkingConfig, ChunkingConfig, ChunkingProfiles};
use vault_search_core::fusion::FusionStrategy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingProfilesConfig,
}

/// Connection and batching parameters for the embedding service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service.
    #[serde(default = "default_url")]
    pub url: String,
    /// Expected embedding dimensionality; responses with any other length
    /// are rejected.
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Texts per HTTP request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent in-flight requests during parallel embedding.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Default knobs for the hybrid retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_fts_weight")]
    pub fts_weight: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default)]
    pub strategy: FusionStrategy,
    /// Minimum cosine similarity for vector hits.
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
}

/// Windowing bounds for one content type, as raw TOML numbers. Converted
/// into a validated [`ChunkingConfig`] at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkBounds {
    pub target_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub overlap: usize,
}

impl ChunkBounds {
    fn to_core(&self, section: &str) -> Result<ChunkingConfig> {
        ChunkingConfig::new(self.target_size, self.min_size, self.max_size, self.overlap)
            .with_context(|| format!("invalid chunking.{section} bounds"))
    }
}

impl From<&ChunkingConfig> for ChunkBounds {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            target_size: config.target_size(),
            min_size: config.min_size(),
            max_size: config.max_size(),
            overlap: config.overlap(),
        }
    }
}

/// Per-content-type chunking bounds. Defaults mirror the built-in presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingProfilesConfig {
    #[serde(default = "default_document_bounds")]
    pub document: ChunkBounds,
    #[serde(default = "default_transcript_bounds")]
    pub transcript: ChunkBounds,
    #[serde(default = "default_email_bounds")]
    pub email: ChunkBounds,
    #[serde(default = "default_chat_bounds")]
    pub chat: ChunkBounds,
    /// Gap (minutes) that starts a new chat conversation window.
    #[serde(default = "default_chat_window_minutes")]
    pub chat_window_minutes: u64,
}

impl Default for ChunkingProfilesConfig {
    fn default() -> Self {
        Self {
            document: default_document_bounds(),
            transcript: default_transcript_bounds(),
            email: default_email_bounds(),
            chat: default_chat_bounds(),
            chat_window_minutes: default_chat_window_minutes(),
        }
    }
}

impl ChunkingProfilesConfig {
    pub fn document(&self) -> Result<ChunkingConfig> {
        self.document.to_core("document")
    }

    pub fn transcript(&self) -> Result<ChunkingConfig> {
        self.transcript.to_core("transcript")
    }

    pub fn email(&self) -> Result<ChunkingConfig> {
        self.email.to_core("email")
    }

    pub fn chat(&self) -> Result<ChatChunkingConfig> {
        let window = self.chat.to_core("chat")?;
        ChatChunkingConfig::new(window, self.chat_window_minutes)
            .context("invalid chunking.chat_window_minutes")
    }

    /// The document/transcript pair handed to the smart chunker.
    pub fn profiles(&self) -> Result<ChunkingProfiles> {
        Ok(ChunkingProfiles {
            document: self.document()?,
            transcript: self.transcript()?,
        })
    }
}

fn default_document_bounds() -> ChunkBounds {
    ChunkBounds::from(&ChunkingConfig::document())
}

fn default_transcript_bounds() -> ChunkBounds {
    ChunkBounds::from(&ChunkingConfig::transcript())
}

fn default_email_bounds() -> ChunkBounds {
    ChunkBounds::from(&ChunkingConfig::email())
}

fn default_chat_bounds() -> ChunkBounds {
    ChunkBounds::from(ChatChunkingConfig::slack().window())
}

fn default_chat_window_minutes() -> u64 {
    ChatChunkingConfig::slack().time_window_minutes()
}

fn default_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_dims() -> usize {
    4096
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    8
}

fn default_concurrency() -> usize {
    2
}

fn default_limit() -> usize {
    20
}

fn default_fts_weight() -> f64 {
    0.4
}

fn default_semantic_weight() -> f64 {
    0.6
}

fn default_threshold() -> f32 {
    0.5
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            dims: default_dims(),
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            fts_weight: default_fts_weight(),
            semantic_weight: default_semantic_weight(),
            strategy: FusionStrategy::default(),
            similarity_threshold: default_threshold(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error when any knob is zero where a positive value is
    /// required, or when the fusion weights fall outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be positive");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be positive");
        }
        if self.embedding.concurrency == 0 {
            bail!("embedding.concurrency must be positive");
        }
        if self.retrieval.limit == 0 {
            bail!("retrieval.limit must be positive");
        }
        for (name, w) in [
            ("retrieval.fts_weight", self.retrieval.fts_weight),
            ("retrieval.semantic_weight", self.retrieval.semantic_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                bail!("{name} must be within [0, 1], got {w}");
            }
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            bail!(
                "retrieval.similarity_threshold must be within [0, 1], got {}",
                self.retrieval.similarity_threshold
            );
        }
        self.chunking.profiles()?;
        self.chunking.email()?;
        self.chunking.chat()?;
        Ok(())
    }
}

/// Load and validate configuration from a TOML file.
///
/// # Errors
///
/// Returns an error when the file cannot be read, fails to parse, or
/// fails validation.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.embedding.url, "http://localhost:8081");
        assert_eq!(config.embedding.dims, 4096);
        assert_eq!(config.embedding.batch_size, 8);
        assert_eq!(config.embedding.concurrency, 2);
        assert_eq!(config.retrieval.limit, 20);
        assert_eq!(config.retrieval.strategy, FusionStrategy::Rrf);
        config.validate().unwrap();
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            url = "http://10.0.0.5:8081"
            batch_size = 16

            [retrieval]
            strategy = "weighted"
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.url, "http://10.0.0.5:8081");
        assert_eq!(config.embedding.batch_size, 16);
        assert_eq!(config.embedding.dims, 4096);
        assert_eq!(config.retrieval.strategy, FusionStrategy::Weighted);
        assert_eq!(config.retrieval.limit, 20);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
            [embedding]
            uri = "http://localhost:8081"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn chunking_defaults_mirror_the_presets() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.chunking.document().unwrap(), ChunkingConfig::document());
        assert_eq!(
            config.chunking.transcript().unwrap(),
            ChunkingConfig::transcript()
        );
        assert_eq!(config.chunking.email().unwrap(), ChunkingConfig::email());
        let chat = config.chunking.chat().unwrap();
        assert_eq!(chat.window(), ChatChunkingConfig::slack().window());
        assert_eq!(chat.time_window_minutes(), 15);
    }

    #[test]
    fn chunking_bounds_are_configurable_per_type() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            chat_window_minutes = 30

            [chunking.document]
            target_size = 1000
            min_size = 400
            max_size = 1200
            overlap = 100
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.chunking.document().unwrap(),
            ChunkingConfig::new(1000, 400, 1200, 100).unwrap()
        );
        // Untouched sections keep their presets.
        assert_eq!(config.chunking.email().unwrap(), ChunkingConfig::email());
        assert_eq!(config.chunking.chat().unwrap().time_window_minutes(), 30);
    }

    #[test]
    fn invalid_chunking_bounds_fail_validation() {
        let config: Config = toml::from_str(
            r#"
            [chunking.transcript]
            target_size = 1000
            min_size = 400
            max_size = 1200
            overlap = 1000
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunking.transcript"));
    }

    #[test]
    fn zero_knobs_fail_validation() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_weights_fail_validation() {
        let mut config = Config::default();
        config.retrieval.fts_weight = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrieval.similarity_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retrieval]\nlimit = 5").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.retrieval.limit, 5);
    }

    #[test]
    fn load_config_fails_on_missing_file() {
        assert!(load_config(Path::new("/nonexistent/vault.toml")).is_err());
    }
}
