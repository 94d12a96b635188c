//! HTTP client for the local embedding service.
//!
//! The service exposes `POST /embedding` taking `{"content": [...]}` and
//! returning a JSON array of `{"index": n, "embedding": [...]}` rows, plus
//! `GET /health`. Rows may arrive in any order; the client reorders them
//! by index so output always lines up with input.
//!
//! Failures are surfaced immediately, never retried: the service is local
//! and a failing request means the caller should degrade (drop the
//! semantic side of a search) rather than wait.
//!
//! # Algorithm (parallel embedding)
//!
//! Texts are split into batches of `batch_size`. A shared atomic cursor
//! hands out batch indices to `concurrency` workers; each worker embeds
//! its batch and writes the vectors into a slot keyed by batch index.
//! Output order is therefore independent of worker scheduling. A failed
//! batch flips a shared abort flag, so the other workers finish their
//! in-flight batch and stop instead of embedding the rest of the queue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;

/// Progress callback for bulk embedding: `(texts_done, texts_total)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Errors from the embedding service.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The service answered with a non-success status.
    #[error("embedding service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },
    /// The service could not be reached (connection refused, timeout).
    #[error("embedding service unreachable")]
    Unreachable(#[source] reqwest::Error),
    /// The service answered 200 but the payload was unusable.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for the embedding service. Cheap to clone; clones share the
/// underlying connection pool.
#[derive(Debug, Clone)]
pub struct EmbedClient {
    http: reqwest::Client,
    config: Arc<EmbeddingConfig>,
}

impl EmbedClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(config: EmbeddingConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Check whether the embedding service is up.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.config.url);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                debug!(error = %err, "embedding health check failed");
                false
            }
        }
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// See [`EmbedError`].
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::InvalidResponse("empty response for single text".into()))
    }

    /// Embed one batch of texts in a single request.
    ///
    /// The returned vectors line up with `texts` regardless of the order
    /// the service emitted its rows in.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::InvalidResponse`] when the row count or any
    /// embedding dimensionality does not match expectations.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embedding", self.config.url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "content": texts }))
            .send()
            .await
            .map_err(EmbedError::Unreachable)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<EmbeddingRow> = resp
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;

        if rows.len() != texts.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                rows.len()
            )));
        }

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for row in rows {
            if row.embedding.len() != self.config.dims {
                return Err(EmbedError::InvalidResponse(format!(
                    "embedding {} has {} dims, expected {}",
                    row.index,
                    row.embedding.len(),
                    self.config.dims
                )));
            }
            let slot = slots.get_mut(row.index).ok_or_else(|| {
                EmbedError::InvalidResponse(format!("embedding index {} out of range", row.index))
            })?;
            if slot.replace(row.embedding).is_some() {
                return Err(EmbedError::InvalidResponse(format!(
                    "duplicate embedding index {}",
                    row.index
                )));
            }
        }

        // Row count matched and no index repeated, so every slot is full.
        Ok(slots.into_iter().flatten().collect())
    }

    /// Embed many texts sequentially, one batch at a time.
    ///
    /// # Errors
    ///
    /// Fails on the first batch error; earlier batches' work is discarded.
    pub async fn embed_chunked(
        &self,
        texts: &[String],
        progress: Option<ProgressFn>,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
            if let Some(progress) = &progress {
                progress(vectors.len(), texts.len());
            }
        }
        Ok(vectors)
    }

    /// Embed many texts with bounded concurrency.
    ///
    /// Output order matches input order regardless of which worker
    /// finishes first.
    ///
    /// # Errors
    ///
    /// Fails if any batch fails; remaining workers stop at the next batch
    /// boundary.
    pub async fn embed_parallel(
        &self,
        texts: &[String],
        progress: Option<ProgressFn>,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<String>> = texts
            .chunks(self.config.batch_size)
            .map(|c| c.to_vec())
            .collect();
        let total_texts = texts.len();
        let workers = self.config.concurrency.min(batches.len());

        let batches = Arc::new(batches);
        let cursor = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicBool::new(false));
        let slots: Arc<Mutex<Vec<Option<Vec<Vec<f32>>>>>> =
            Arc::new(Mutex::new(vec![None; batches.len()]));

        let mut set: JoinSet<Result<(), EmbedError>> = JoinSet::new();
        for _ in 0..workers {
            let client = self.clone();
            let batches = Arc::clone(&batches);
            let cursor = Arc::clone(&cursor);
            let done = Arc::clone(&done);
            let failed = Arc::clone(&failed);
            let slots = Arc::clone(&slots);
            let progress = progress.clone();

            set.spawn(async move {
                loop {
                    if failed.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    let i = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(batch) = batches.get(i) else {
                        return Ok(());
                    };
                    let vectors = match client.embed_batch(batch).await {
                        Ok(vectors) => vectors,
                        Err(err) => {
                            failed.store(true, Ordering::SeqCst);
                            return Err(err);
                        }
                    };
                    let completed =
                        done.fetch_add(batch.len(), Ordering::SeqCst) + batch.len();
                    slots.lock().unwrap()[i] = Some(vectors);
                    if let Some(progress) = &progress {
                        progress(completed, total_texts);
                    }
                }
            });
        }

        let mut first_error: Option<EmbedError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = %err, "embedding batch failed");
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    first_error.get_or_insert(EmbedError::InvalidResponse(format!(
                        "embedding worker aborted: {err}"
                    )));
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let slots = Arc::try_unwrap(slots)
            .map_err(|_| EmbedError::InvalidResponse("embedding worker leaked its slot".into()))?
            .into_inner()
            .map_err(|_| EmbedError::InvalidResponse("embedding slot lock poisoned".into()))?;
        Ok(slots.into_iter().flatten().flatten().collect())
    }
}

/// Anything that can turn a query string into a query vector. The search
/// engine depends on this seam so tests can stub the embedding service.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed_query(&self, query: &str) -> anyhow::Result<Vec<f32>>;
}

#[async_trait]
impl QueryEmbedder for EmbedClient {
    async fn embed_query(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.embed(query).await?)
    }
}
