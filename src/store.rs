//! Vector store adapter over SQLite.
//!
//! One logical table of chunks, keyed by (`subject_id`, `note_id`,
//! `chunk_index`). Similarity search fetches stored vectors and computes
//! cosine similarity in Rust; `list_recent` is the explicit fallback path
//! when search is unavailable or returns nothing.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::{Config, StoreConfig};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ChunkMetadata, RetrievalResult};

pub struct VectorStore {
    pool: SqlitePool,
    upsert_batch_size: usize,
}

/// Operational summary returned by [`VectorStore::stats`].
#[derive(Debug)]
pub struct StoreStats {
    pub total_chunks: i64,
    pub unique_subjects: i64,
    pub unique_notes: i64,
    pub sample_recent: Vec<Chunk>,
}

impl VectorStore {
    pub fn new(pool: SqlitePool, cfg: &StoreConfig) -> Self {
        Self {
            pool,
            upsert_batch_size: cfg.upsert_batch_size,
        }
    }

    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.db).await?;
        Ok(Self::new(pool, &config.store))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Verify the store's recorded embedding dimensionality against the
    /// configured provider, recording it on first use. A mismatch means the
    /// deployment was reconfigured against an already-populated store, which
    /// would silently break similarity math — abort instead.
    pub async fn ensure_dims(&self, model: &str, dims: usize) -> Result<()> {
        let existing = sqlx::query("SELECT model, dims FROM embedding_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(row) => {
                let stored_dims: i64 = row.get("dims");
                if stored_dims != dims as i64 {
                    let stored_model: String = row.get("model");
                    bail!(
                        "Embedding dimensionality mismatch: store holds {}-dim vectors ({}), provider produces {}-dim ({})",
                        stored_dims,
                        stored_model,
                        dims,
                        model
                    );
                }
                Ok(())
            }
            None => {
                sqlx::query("INSERT INTO embedding_meta (id, model, dims) VALUES (1, ?, ?)")
                    .bind(model)
                    .bind(dims as i64)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
        }
    }

    /// Upsert chunk records, split into sequential sub-batches, each in its
    /// own transaction. Last write wins per identity key.
    pub async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let mut written = 0u64;

        for batch in chunks.chunks(self.upsert_batch_size) {
            let mut tx = self.pool.begin().await?;

            for chunk in batch {
                sqlx::query(
                    r#"
                    INSERT INTO chunks (id, subject_id, note_id, chunk_index, content, embedding,
                                        note_type, authoring_party, organization, note_timestamp,
                                        source_bundle_id, chunk_total, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(subject_id, note_id, chunk_index) DO UPDATE SET
                        content = excluded.content,
                        embedding = excluded.embedding,
                        note_type = excluded.note_type,
                        authoring_party = excluded.authoring_party,
                        organization = excluded.organization,
                        note_timestamp = excluded.note_timestamp,
                        source_bundle_id = excluded.source_bundle_id,
                        chunk_total = excluded.chunk_total,
                        created_at = excluded.created_at
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&chunk.subject_id)
                .bind(&chunk.note_id)
                .bind(chunk.chunk_index)
                .bind(&chunk.content)
                .bind(vec_to_blob(&chunk.embedding))
                .bind(&chunk.metadata.note_type)
                .bind(&chunk.metadata.authoring_party)
                .bind(&chunk.metadata.organization)
                .bind(&chunk.metadata.timestamp)
                .bind(&chunk.metadata.source_bundle_id)
                .bind(chunk.metadata.chunk_total)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                written += 1;
            }

            tx.commit().await?;
        }

        Ok(written)
    }

    /// Nearest-neighbour search: cosine similarity against every stored
    /// vector (optionally scoped to one subject), thresholded strictly above
    /// `min_similarity`, ordered by descending similarity.
    pub async fn search(
        &self,
        query_vec: &[f32],
        subject_id: Option<&str>,
        limit: i64,
        min_similarity: f32,
    ) -> Result<Vec<RetrievalResult>> {
        let rows = match subject_id {
            Some(subject) => {
                sqlx::query("SELECT * FROM chunks WHERE subject_id = ?")
                    .bind(subject)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query("SELECT * FROM chunks").fetch_all(&self.pool).await?,
        };

        let mut results: Vec<RetrievalResult> = rows
            .iter()
            .map(|row| {
                let chunk = row_to_chunk(row);
                let similarity = cosine_similarity(query_vec, &chunk.embedding);
                RetrievalResult { chunk, similarity }
            })
            .filter(|r| r.similarity > min_similarity)
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit.max(0) as usize);

        Ok(results)
    }

    /// Most recently ingested chunks, newest first. Fallback result set when
    /// similarity search is unavailable or empty.
    pub async fn list_recent(&self, subject_id: Option<&str>, limit: i64) -> Result<Vec<Chunk>> {
        let sql_scoped = r#"
            SELECT * FROM chunks WHERE subject_id = ?
            ORDER BY created_at DESC, note_id, chunk_index
            LIMIT ?
        "#;
        let sql_all = r#"
            SELECT * FROM chunks
            ORDER BY created_at DESC, note_id, chunk_index
            LIMIT ?
        "#;

        let rows = match subject_id {
            Some(subject) => {
                sqlx::query(sql_scoped)
                    .bind(subject)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query(sql_all).bind(limit).fetch_all(&self.pool).await?,
        };

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    /// Remove every chunk belonging to a note. Returns the number deleted.
    pub async fn delete_by_note(&self, note_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE note_id = ?")
            .bind(note_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let unique_subjects: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT subject_id) FROM chunks")
                .fetch_one(&self.pool)
                .await?;
        let unique_notes: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT note_id) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let sample_recent = self.list_recent(None, 5).await?;

        Ok(StoreStats {
            total_chunks,
            unique_subjects,
            unique_notes,
            sample_recent,
        })
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let blob: Vec<u8> = row.get("embedding");
    Chunk {
        subject_id: row.get("subject_id"),
        note_id: row.get("note_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        embedding: blob_to_vec(&blob),
        metadata: ChunkMetadata {
            note_type: row.get("note_type"),
            timestamp: row.get("note_timestamp"),
            authoring_party: row.get("authoring_party"),
            organization: row.get("organization"),
            source_bundle_id: row.get("source_bundle_id"),
            chunk_total: row.get("chunk_total"),
        },
    }
}
