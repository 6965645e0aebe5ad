//! Retrieval and context assembly.
//!
//! Turns a free-text query into a bounded, patient-scoped text block for
//! prompt injection. Degrades rather than fails: an embedding failure yields
//! an explicit "no context" block, and a search error or empty result set
//! falls back to the most recently ingested chunks so the consumer always
//! has something to work with.

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::{Chunk, ContextBlock};
use crate::store::VectorStore;

const HEADER: &str = "=== RELEVANT CLINICAL NOTES ===";
const FOOTER: &str = "=== END CLINICAL NOTES ===";

/// Sentinel returned when nothing could be retrieved even via the fallback.
/// Distinguishable from a populated block by the absence of the banner.
pub const NO_CONTEXT: &str = "No relevant clinical notes were found for this patient.";

/// Assemble a retrieval context for a query, optionally scoped to one
/// subject. Never errors: every failure path maps to a fallback or to the
/// sentinel block.
pub async fn build_context(
    store: &VectorStore,
    provider: &dyn EmbeddingProvider,
    config: &Config,
    query: &str,
    subject_id: Option<&str>,
    limit: i64,
    min_similarity: f32,
) -> ContextBlock {
    let query_vec = match embedding::embed_query(provider, &config.embedding, query).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed, returning empty context");
            return ContextBlock::empty(NO_CONTEXT);
        }
    };

    let chunks = match store.search(&query_vec, subject_id, limit, min_similarity).await {
        Ok(results) if !results.is_empty() => {
            results.into_iter().map(|r| r.chunk).collect::<Vec<_>>()
        }
        Ok(_) => {
            tracing::debug!("similarity search empty, falling back to recent chunks");
            fallback_recent(store, subject_id, limit).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "similarity search failed, falling back to recent chunks");
            fallback_recent(store, subject_id, limit).await
        }
    };

    if chunks.is_empty() {
        return ContextBlock::empty(NO_CONTEXT);
    }

    format_block(&chunks)
}

async fn fallback_recent(store: &VectorStore, subject_id: Option<&str>, limit: i64) -> Vec<Chunk> {
    match store.list_recent(subject_id, limit).await {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(error = %e, "recency fallback failed");
            Vec::new()
        }
    }
}

fn format_block(chunks: &[Chunk]) -> ContextBlock {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');

    for (i, chunk) in chunks.iter().enumerate() {
        out.push_str(&format_record(i + 1, chunk));
        out.push('\n');
    }

    out.push_str(FOOTER);

    ContextBlock {
        text: out,
        count: chunks.len(),
    }
}

fn format_record(seq: usize, chunk: &Chunk) -> String {
    let date = chunk.metadata.timestamp.as_deref().unwrap_or("unknown date");
    let org = chunk.metadata.organization.as_deref().unwrap_or("-");

    format!(
        "[{}] {} | {} | {} | {}\nNote {} (part {} of {})\n{}\n",
        seq,
        chunk.metadata.note_type,
        date,
        chunk.metadata.authoring_party,
        org,
        chunk.note_id,
        chunk.chunk_index + 1,
        chunk.metadata.chunk_total,
        chunk.content
    )
}
