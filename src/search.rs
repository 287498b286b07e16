use anyhow::{bail, Result};

use blog_rag_core::locale::Locale;
use blog_rag_core::retrieve::RetrievalParams;

use crate::config::Config;
use crate::services;

/// `blog-rag search`: print the passages most similar to `query`.
pub async fn run_search(
    config: &Config,
    query: &str,
    locale: Option<String>,
    top_k: Option<usize>,
    min_similarity: Option<f64>,
    content_type: Option<String>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let locale = match locale {
        Some(l) => Some(l.parse::<Locale>()?),
        None => None,
    };
    let params = RetrievalParams {
        top_k: top_k.unwrap_or(10),
        min_similarity: min_similarity.unwrap_or(config.retrieval.min_similarity),
        content_type,
    };

    let (pool, services) = services::from_config(config).await?;
    let passages = services
        .retriever
        .retrieve(query, locale.as_ref().map(Locale::as_str), &params)
        .await?;

    if passages.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, p) in passages.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / {}",
            i + 1,
            p.similarity,
            p.content_type,
            p.title
        );
        println!("    locale: {}", p.locale);
        println!("    url: {}", p.url);
        println!("    excerpt: \"{}\"", p.excerpt.replace('\n', " ").trim());
        println!();
    }

    pool.close().await;
    Ok(())
}
