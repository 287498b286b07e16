use anyhow::{bail, Result};
use futures_util::StreamExt;
use std::io::Write;

use blog_rag_core::generation::StreamEvent;
use blog_rag_core::locale::{no_results_message, Locale};
use blog_rag_core::retrieve::RetrievalParams;

use crate::config::Config;
use crate::services;

/// `blog-rag ask`: retrieve, then stream the answer to stdout as it is
/// generated. Sources are listed before the answer.
pub async fn run_ask(config: &Config, query: &str, locale: Locale) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    if !config.embedding.is_enabled() || !config.generation.is_enabled() {
        bail!("ask requires both [embedding] and [generation] providers to be configured.");
    }

    let (pool, services) = services::from_config(config).await?;
    let params = RetrievalParams {
        top_k: config.retrieval.top_k,
        min_similarity: config.retrieval.min_similarity,
        content_type: None,
    };
    let passages = services
        .retriever
        .retrieve(query, Some(locale.as_str()), &params)
        .await?;

    if passages.is_empty() {
        println!("{}", no_results_message(locale));
        pool.close().await;
        return Ok(());
    }

    let mut events = services.orchestrator.stream(query, locale, passages);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Sources { sources } => {
                println!("Sources:");
                for (i, p) in sources.iter().enumerate() {
                    println!("  {}. {} ({}) [{:.3}]", i + 1, p.title, p.url, p.similarity);
                }
                println!();
            }
            StreamEvent::Content { content } => {
                write!(stdout, "{}", content)?;
                stdout.flush()?;
            }
            StreamEvent::Done => {
                writeln!(stdout)?;
            }
        }
    }

    pool.close().await;
    Ok(())
}
