use anyhow::Result;

use crate::config::Config;
use crate::store::VectorStore;

/// Print an operational summary of the store.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = VectorStore::open(config).await?;
    let stats = store.stats().await?;

    println!("Store: {}", config.db.path.display());
    println!("  Total chunks:    {}", stats.total_chunks);
    println!("  Unique subjects: {}", stats.unique_subjects);
    println!("  Unique notes:    {}", stats.unique_notes);

    if !stats.sample_recent.is_empty() {
        println!("  Most recent:");
        for chunk in &stats.sample_recent {
            let date = chunk.metadata.timestamp.as_deref().unwrap_or("unknown date");
            println!(
                "    {} [{}] {} (part {} of {})",
                chunk.note_id,
                chunk.metadata.note_type,
                date,
                chunk.chunk_index + 1,
                chunk.metadata.chunk_total
            );
        }
    }

    store.close().await;
    Ok(())
}
