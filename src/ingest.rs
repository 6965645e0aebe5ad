//! Ingestion pipeline: walk bundle files, extract candidate notes, sanitize,
//! chunk, embed, and upsert into the vector store.
//!
//! The pipeline is fail-soft throughout. A malformed file, a rejected note,
//! or a failed embedding call is tallied and logged, and the run moves on;
//! only configuration problems detected up front abort the whole run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::bundle::Bundle;
use crate::chunk::chunk_text;
use crate::config::{Config, EmbeddingConfig};
use crate::embedding;
use crate::extract;
use crate::models::{CandidateNote, Chunk, ChunkMetadata};
use crate::sanitize;
use crate::store::VectorStore;

#[derive(Debug, Default)]
struct IngestTally {
    files_processed: usize,
    file_errors: usize,
    notes_extracted: usize,
    notes_rejected: usize,
    notes_ingested: usize,
    chunks_written: u64,
    chunks_failed: usize,
}

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !dry_run && !config.embedding.is_enabled() {
        anyhow::bail!(
            "Ingestion requires an embedding provider; set [embedding] provider to 'openai' or 'mock', or use --dry-run"
        );
    }

    let files = collect_bundle_files(path)?;
    if files.is_empty() {
        println!("No .json bundle files found under {}", path.display());
        return Ok(());
    }

    // Provider and store are constructed once and threaded through the run.
    let provider = embedding::create_provider(&config.embedding)?;
    let store = if dry_run {
        None
    } else {
        let store = VectorStore::open(config).await?;
        store
            .ensure_dims(provider.model_name(), provider.dims())
            .await?;
        Some(store)
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing current note");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut tally = IngestTally::default();

    'files: for file in &files {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let bundle = match read_bundle(file) {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable bundle");
                tally.file_errors += 1;
                continue;
            }
        };

        tally.files_processed += 1;
        let notes = extract::extract_notes(&bundle);
        tally.notes_extracted += notes.len();

        for note in notes {
            if cancel.load(Ordering::SeqCst) {
                break 'files;
            }
            if let Some(max) = limit {
                if tally.notes_ingested >= max {
                    tracing::debug!(max, "note limit reached, stopping");
                    break 'files;
                }
            }

            process_note(config, provider.as_ref(), store.as_ref(), note, dry_run, &mut tally)
                .await;
        }
    }

    if let Some(store) = store {
        store.close().await;
    }

    print_summary(&tally, dry_run, cancel.load(Ordering::SeqCst));
    Ok(())
}

async fn process_note(
    config: &Config,
    provider: &dyn embedding::EmbeddingProvider,
    store: Option<&VectorStore>,
    note: CandidateNote,
    dry_run: bool,
    tally: &mut IngestTally,
) {
    let clean = match sanitize::sanitize(&note.raw_text, &config.sanitizer) {
        Ok(text) => text,
        Err(reason) => {
            tracing::debug!(note_id = %note.note_id, %reason, "note rejected");
            tally.notes_rejected += 1;
            return;
        }
    };

    let pieces = chunk_text(&clean, config.chunking.size, config.chunking.overlap);
    if pieces.is_empty() {
        tally.notes_rejected += 1;
        return;
    }

    if dry_run {
        tracing::debug!(note_id = %note.note_id, chunks = pieces.len(), "dry run, not writing");
        tally.notes_ingested += 1;
        tally.chunks_written += pieces.len() as u64;
        return;
    }

    let vectors = embed_note_pieces(provider, &config.embedding, &note.note_id, &pieces).await;
    let (chunks, failed) = build_chunks(&note, pieces, vectors);
    tally.chunks_failed += failed;
    if chunks.is_empty() {
        tracing::warn!(note_id = %note.note_id, "every chunk failed to embed, dropping note");
        return;
    }

    // Store is always open outside dry runs, and dry runs returned above.
    let Some(store) = store else { return };
    match store.upsert_chunks(&chunks).await {
        Ok(written) => {
            tally.notes_ingested += 1;
            tally.chunks_written += written;
        }
        Err(e) => {
            tracing::warn!(note_id = %note.note_id, error = %e, "upsert failed, dropping note");
            tally.chunks_failed += chunks.len();
        }
    }
}

/// Embed a note's chunks one provider batch at a time. A failed batch drops
/// only its own chunks (marked `None`); chunks in other batches of the same
/// note still proceed to the upsert.
async fn embed_note_pieces(
    provider: &dyn embedding::EmbeddingProvider,
    config: &EmbeddingConfig,
    note_id: &str,
    pieces: &[String],
) -> Vec<Option<Vec<f32>>> {
    let mut out = Vec::with_capacity(pieces.len());
    for batch in pieces.chunks(config.batch_size.max(1)) {
        match embedding::embed_texts(provider, config, batch).await {
            Ok(vectors) => out.extend(vectors.into_iter().map(Some)),
            Err(e) => {
                tracing::warn!(
                    note_id,
                    dropped = batch.len(),
                    error = %e,
                    "embedding batch failed, dropping its chunks"
                );
                out.extend(std::iter::repeat_with(|| None).take(batch.len()));
            }
        }
    }
    out
}

/// Pair each piece with its vector, skipping pieces whose embedding failed.
/// Indexes and `chunk_total` reflect the original split, so a surviving chunk
/// keeps its position even when a sibling is dropped.
fn build_chunks(
    note: &CandidateNote,
    pieces: Vec<String>,
    vectors: Vec<Option<Vec<f32>>>,
) -> (Vec<Chunk>, usize) {
    let chunk_total = pieces.len() as i64;
    let mut chunks = Vec::new();
    let mut failed = 0;

    for (i, (content, vector)) in pieces.into_iter().zip(vectors).enumerate() {
        let Some(embedding) = vector else {
            failed += 1;
            continue;
        };
        chunks.push(Chunk {
            subject_id: note.subject_id.clone(),
            note_id: note.note_id.clone(),
            chunk_index: i as i64,
            content,
            embedding,
            metadata: ChunkMetadata {
                note_type: note.note_type.clone(),
                timestamp: note.timestamp.clone(),
                authoring_party: note.authoring_party.clone(),
                organization: note.organization.clone(),
                source_bundle_id: note.source_bundle_id.clone(),
                chunk_total,
            },
        });
    }

    (chunks, failed)
}

/// Collect bundle files under `path` in a stable order. A file path is used
/// as-is; a directory is walked recursively for `.json` files.
fn collect_bundle_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("No such file or directory: {}", path.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn read_bundle(path: &Path) -> Result<Bundle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let bundle: Bundle = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse FHIR bundle {}", path.display()))?;
    Ok(bundle)
}

fn print_summary(tally: &IngestTally, dry_run: bool, interrupted: bool) {
    if interrupted {
        println!("Ingestion interrupted.");
    }
    if dry_run {
        println!("Dry run (no embeddings computed, nothing written):");
    }
    println!("  Files processed:  {}", tally.files_processed);
    println!("  File errors:      {}", tally.file_errors);
    println!("  Notes extracted:  {}", tally.notes_extracted);
    println!("  Notes rejected:   {}", tally.notes_rejected);
    println!("  Notes ingested:   {}", tally.notes_ingested);
    println!("  Chunks written:   {}", tally.chunks_written);
    if tally.chunks_failed > 0 {
        println!("  Chunks failed:    {}", tally.chunks_failed);
    }
}
