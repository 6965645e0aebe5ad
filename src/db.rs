//! SQLite connection pool for the chunk store.
//!
//! Opens (and creates on first use) the database named by `[db].path`, with
//! WAL journaling so `context` and `stats` can read while an ingest run holds
//! the writer. Pool size comes from `[db].max_connections`.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::DbConfig;

pub async fn connect(db: &DbConfig) -> Result<SqlitePool> {
    if let Some(parent) = db.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db.path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(db.max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database at {}", db.path.display()))?;

    Ok(pool)
}
