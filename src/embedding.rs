//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAiProvider`]**: calls an OpenAI-compatible embeddings API with batching,
//!   bounded retry, and fixed backoff.
//! - **[`MockProvider`]**: deterministic seeded vectors for plumbing tests only;
//!   never a stand-in for real retrieval quality, and loudly logged.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error): retry after a fixed
//!   backoff (`backoff_secs`, default 5s), up to `max_retries` attempts
//! - HTTP 4xx (client error, not 429): fail immediately
//! - Network errors: retry
//!
//! The retry bound is deliberate: an unconditional retry loop hides outages
//! and can spin forever against a persistently throttling provider.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Trait for embedding providers.
///
/// Carries the provider's fixed metadata; the embedding computation itself is
/// performed by [`embed_texts`].
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768` or `1024`).
    fn dims(&self) -> usize;
}

/// Embed a batch of texts using the configured provider.
///
/// Splits the input into provider-sized sub-batches and returns one vector
/// per input text, in input order. Every returned vector is checked against
/// the provider's declared dimensionality; a mismatch is a configuration
/// error and fails the whole call.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let mut all = Vec::with_capacity(texts.len());

    for batch in texts.chunks(config.batch_size.max(1)) {
        let vectors = match config.provider.as_str() {
            "openai" => embed_openai(config, batch).await?,
            "mock" => embed_mock(config, provider.dims(), batch),
            "disabled" => bail!("Embedding provider is disabled"),
            other => bail!("Unknown embedding provider: {}", other),
        };

        if vectors.len() != batch.len() {
            bail!(
                "Provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
        }
        for v in &vectors {
            if v.len() != provider.dims() {
                bail!(
                    "Embedding dimensionality mismatch: provider declares {}, got {}",
                    provider.dims(),
                    v.len()
                );
            }
        }
        all.extend(vectors);
    }

    Ok(all)
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_texts(provider, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ OpenAI-compatible Provider ============

/// Embedding provider for an OpenAI-compatible `POST /v1/embeddings` endpoint.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for openai provider"))?;

        // Missing credentials abort startup, not the first embed call.
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(config.backoff_secs)).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_embeddings_response(&json);
                }

                // Rate limited or server error: wait out the backoff and retry.
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    tracing::warn!(
                        status = status.as_u16(),
                        attempt,
                        "embedding request throttled, backing off"
                    );
                    last_err = Some(anyhow::anyhow!(
                        "Embedding API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429), don't retry.
                let body_text = response.text().await.unwrap_or_default();
                bail!("Embedding API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Mock Provider ============

/// Deterministic pseudo-random vectors derived from (seed, text).
///
/// Validates pipeline plumbing only. Similar texts do NOT get similar
/// vectors, so retrieval quality cannot be judged against it.
pub struct MockProvider {
    dims: usize,
}

impl MockProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for mock provider"))?;
        tracing::warn!(dims, "MOCK embedding provider active, vectors carry no semantics");
        Ok(Self { dims })
    }
}

impl EmbeddingProvider for MockProvider {
    fn model_name(&self) -> &str {
        "mock"
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

fn embed_mock(config: &EmbeddingConfig, dims: usize, texts: &[String]) -> Vec<Vec<f32>> {
    texts
        .iter()
        .map(|t| mock_vector(config.mock_seed, t, dims))
        .collect()
}

/// Expand SHA-256 of (seed, text, counter) into `dims` floats in [-1, 1].
fn mock_vector(seed: u64, text: &str, dims: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dims);
    let mut counter: u64 = 0;

    while out.len() < dims {
        let mut hasher = Sha256::new();
        hasher.update(seed.to_le_bytes());
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();

        for chunk in digest.chunks_exact(4) {
            if out.len() == dims {
                break;
            }
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            out.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        counter += 1;
    }

    out
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "mock" => Ok(Box::new(MockProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
