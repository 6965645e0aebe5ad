use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Connection pool size. WAL journaling lets `context` and `stats` read
    /// alongside an ingest run's writer, so more than one is useful.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SanitizerConfig {
    /// Floor applied to trimmed raw text before any cleaning. Permissive by
    /// default; strict deployments raise it (100 was also used in practice).
    #[serde(default = "default_min_raw_chars")]
    pub min_raw_chars: usize,
    /// Floor applied after cleaning. This is the binding gate: template
    /// removal can collapse a long note to near-nothing.
    #[serde(default = "default_min_clean_chars")]
    pub min_clean_chars: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            min_raw_chars: default_min_raw_chars(),
            min_clean_chars: default_min_clean_chars(),
        }
    }
}

fn default_min_raw_chars() -> usize {
    20
}
fn default_min_clean_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed backoff between rate-limit retries.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Seed for the deterministic mock provider.
    #[serde(default)]
    pub mock_seed: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            timeout_secs: default_timeout_secs(),
            mock_seed: 0,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_limit() -> i64 {
    5
}
fn default_min_similarity() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Upsert batches larger than this are split into sequential sub-batches.
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

fn default_upsert_batch_size() -> usize {
    100
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.size == 0 {
        anyhow::bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.size ({})",
            config.chunking.overlap,
            config.chunking.size
        );
    }

    // Validate sanitizer
    if config.sanitizer.min_clean_chars == 0 {
        anyhow::bail!("sanitizer.min_clean_chars must be > 0");
    }

    // Validate retrieval
    if config.retrieval.limit < 1 {
        anyhow::bail!("retrieval.limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
        anyhow::bail!("retrieval.min_similarity must be in [0.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider == "openai" && config.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified for the openai provider");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "mock" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or mock.",
            other
        ),
    }

    if config.store.upsert_batch_size == 0 {
        anyhow::bail!("store.upsert_batch_size must be > 0");
    }

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    Ok(config)
}
