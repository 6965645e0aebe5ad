//! # ChartSift CLI (`chartsift`)
//!
//! The `chartsift` binary is the primary interface for ChartSift. It provides
//! commands for database initialization, FHIR bundle ingestion, context
//! retrieval, note deletion, and store statistics.
//!
//! ## Usage
//!
//! ```bash
//! chartsift --config ./config/chartsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chartsift init` | Create the SQLite database and run schema migrations |
//! | `chartsift ingest <path>` | Ingest FHIR bundle files from a file or directory |
//! | `chartsift context "<query>"` | Assemble a retrieval context block for a query |
//! | `chartsift delete <note-id>` | Remove all chunks of a note from the store |
//! | `chartsift stats` | Print store statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! chartsift init --config ./config/chartsift.toml
//!
//! # Ingest a directory of bundles
//! chartsift ingest ./bundles --config ./config/chartsift.toml
//!
//! # Preview what would be ingested without embedding or writing
//! chartsift ingest ./bundles --dry-run
//!
//! # Patient-scoped retrieval
//! chartsift context "recent cardiology findings" --patient patient-7
//! ```

mod bundle;
mod chunk;
mod config;
mod context;
mod db;
mod embedding;
mod extract;
mod ingest;
mod migrate;
mod models;
mod sanitize;
mod stats;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ChartSift CLI — a clinical-note ingestion and retrieval pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/chartsift.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "chartsift",
    about = "ChartSift — clinical-note ingestion and patient-scoped retrieval over FHIR bundles",
    version,
    long_about = "ChartSift extracts narrative notes from FHIR R4 bundles, removes synthetic \
    template boilerplate, chunks and embeds the remaining text into SQLite, and assembles \
    patient-scoped context blocks by cosine similarity with a recency fallback."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/chartsift.toml`. Database, sanitizer, chunking,
    /// embedding, and retrieval settings are read from this file.
    #[arg(long, global = true, default_value = "./config/chartsift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (chunks,
    /// embedding_meta). This command is idempotent — running it multiple
    /// times is safe.
    Init,

    /// Ingest FHIR bundle files.
    ///
    /// Walks the given file or directory for `.json` bundles, extracts
    /// candidate notes, sanitizes and chunks them, embeds each chunk, and
    /// upserts everything into the store. Re-ingesting the same bundles
    /// updates chunks in place instead of duplicating them.
    Ingest {
        /// A bundle file or a directory to walk recursively for `.json` files.
        path: PathBuf,

        /// Maximum number of notes to ingest in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Parse, sanitize, and chunk without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Assemble a retrieval context block for a query.
    ///
    /// Embeds the query, ranks stored chunks by cosine similarity, and
    /// prints a formatted context block. When nothing clears the similarity
    /// threshold, the most recently ingested chunks are returned instead.
    Context {
        /// The query text.
        query: String,

        /// Restrict retrieval to one patient's notes.
        #[arg(long)]
        patient: Option<String>,

        /// Maximum number of chunks in the block (default from config).
        #[arg(long)]
        limit: Option<i64>,

        /// Minimum cosine similarity for a match (default from config).
        #[arg(long)]
        min_similarity: Option<f32>,
    },

    /// Delete all chunks belonging to a note.
    Delete {
        /// The note identifier, as reported by `ingest` and `context`.
        note_id: String,
    },

    /// Print store statistics.
    ///
    /// Shows chunk, subject, and note counts plus the most recently
    /// ingested chunks.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chartsift=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            limit,
            dry_run,
        } => {
            ingest::run_ingest(&cfg, &path, limit, dry_run).await?;
        }
        Commands::Context {
            query,
            patient,
            limit,
            min_similarity,
        } => {
            let store = store::VectorStore::open(&cfg).await?;
            let provider = embedding::create_provider(&cfg.embedding)?;
            let block = context::build_context(
                &store,
                provider.as_ref(),
                &cfg,
                &query,
                patient.as_deref(),
                limit.unwrap_or(cfg.retrieval.limit),
                min_similarity.unwrap_or(cfg.retrieval.min_similarity),
            )
            .await;
            println!("{}", block.text);
            println!();
            println!("{} record(s)", block.count);
            store.close().await;
        }
        Commands::Delete { note_id } => {
            let store = store::VectorStore::open(&cfg).await?;
            let deleted = store.delete_by_note(&note_id).await?;
            store.close().await;
            if deleted == 0 {
                println!("No chunks found for note '{}'.", note_id);
            } else {
                println!("Deleted {} chunk(s) for note '{}'.", deleted, note_id);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
