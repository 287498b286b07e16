//! Index statistics and maintenance commands.
//!
//! `blog-rag stats` summarizes what is indexed by locale and content type;
//! `blog-rag clear` empties the index before a full rebuild.

use anyhow::Result;

use crate::config::Config;
use crate::services;

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let (pool, index) = services::open_index(config).await?;
    let stats = index.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("blog-rag: index stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Dimensions:  {}", config.embedding.dims);
    println!();
    println!("  Embeddings:  {}", stats.total);

    if !stats.by_locale.is_empty() {
        println!();
        println!("  By locale:");
        for (locale, n) in &stats.by_locale {
            println!("    {:<16} {:>6}", locale, n);
        }
    }
    if !stats.by_content_type.is_empty() {
        println!();
        println!("  By content type:");
        for (content_type, n) in &stats.by_content_type {
            println!("    {:<16} {:>6}", content_type, n);
        }
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Run the clear command: delete every record from the index.
pub async fn run_clear(config: &Config) -> Result<()> {
    let (pool, index) = services::open_index(config).await?;
    let removed = index.clear().await?;
    tracing::info!(removed, "index cleared");
    println!("Cleared {} records.", removed);
    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
