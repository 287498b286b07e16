//! # blog-rag CLI
//!
//! ```bash
//! blog-rag --config ./config/rag.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `blog-rag init` | Create the SQLite database and schema |
//! | `blog-rag index` | Embed every configured source into the index |
//! | `blog-rag search "<query>"` | Print ranked passages |
//! | `blog-rag ask "<query>"` | Stream a grounded answer to stdout |
//! | `blog-rag stats` | Record counts by locale and content type |
//! | `blog-rag clear` | Delete every record from the index |
//! | `blog-rag serve` | Start the HTTP server |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use blog_rag::{ask, config, ingest, migrate, search, server, stats};
use blog_rag_core::locale::Locale;

/// blog-rag: retrieval-augmented answers over a blog's posts and documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "blog-rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database file and schema. Safe to run repeatedly.
    Init,

    /// Discover, clean, embed, and store every configured source.
    ///
    /// Documents are keyed by their path, so re-running updates records
    /// in place. One bad document never aborts the run.
    Index {
        /// Discover and filter documents without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Delete every record before indexing.
        #[arg(long)]
        clear: bool,
    },

    /// Print the passages most similar to a query.
    Search {
        query: String,

        /// Restrict results to one locale (`ko` or `en`).
        #[arg(long)]
        locale: Option<String>,

        /// Maximum number of results.
        #[arg(long)]
        top_k: Option<usize>,

        /// Similarity floor in `[0, 1]`.
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Restrict results to one content type (`blog`, `resume`, ...).
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Answer a question from the indexed content, streaming to stdout.
    Ask {
        query: String,

        #[arg(long, default_value = "ko")]
        locale: Locale,
    },

    /// Show index statistics.
    Stats,

    /// Delete every record from the index.
    Clear,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
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
        Commands::Index { dry_run, clear } => {
            ingest::run_index(&cfg, dry_run, clear).await?;
        }
        Commands::Search {
            query,
            locale,
            top_k,
            min_similarity,
            content_type,
        } => {
            search::run_search(&cfg, &query, locale, top_k, min_similarity, content_type).await?;
        }
        Commands::Ask { query, locale } => {
            ask::run_ask(&cfg, &query, locale).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Clear => {
            stats::run_clear(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
