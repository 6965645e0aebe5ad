use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // One logical table of chunks; (subject_id, note_id, chunk_index) is the
    // identity key, so re-ingestion upserts instead of duplicating.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            note_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            note_type TEXT NOT NULL DEFAULT 'Unknown',
            authoring_party TEXT NOT NULL DEFAULT 'Unknown',
            organization TEXT,
            note_timestamp TEXT,
            source_bundle_id TEXT NOT NULL,
            chunk_total INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(subject_id, note_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Records the embedding model/dims the store was populated with, so a
    // reconfigured provider is caught at startup instead of corrupting search.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            model TEXT NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_subject_id ON chunks(subject_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_note_id ON chunks(note_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_created_at ON chunks(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
