//! Offline indexing pipeline.
//!
//! Discovers MDX documents under the configured sources, strips them down
//! to prose, embeds the leading text in document mode and upserts one
//! [`EmbeddingRecord`] per document:
//!
//! ```text
//! discover → read → front-matter → clean → (skip short) → embed → upsert
//! ```
//!
//! A document that cannot be read, embedded, or written is recorded in the
//! [`IndexSummary`] and the run moves on to the next one.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use blog_rag_core::embedding::EmbeddingGateway;
use blog_rag_core::models::{record_id, EmbeddingRecord};
use blog_rag_core::retrieve::fallback_url;
use blog_rag_core::store::VectorIndex;

use crate::config::{Config, IndexingConfig, SourceConfig, SourceLayout};
use crate::markup::{clean_markup, extract_front_matter, split_list};

/// A file found under a source root, with what its path says about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// Stable key the record id is derived from (`<layout>:<content_type>:<relative path>`).
    pub source_key: String,
    pub slug: String,
    pub layout: SourceLayout,
    /// Directory segment: the locale for `localized`, the type for `typed`.
    pub group: String,
    pub content_type: String,
    pub default_locale: String,
}

/// Walk every configured source and return its documents in path order.
///
/// Fails if two documents would share a record id, which happens when two
/// sources with the same layout and content type hold the same relative path.
pub fn discover(sources: &[SourceConfig]) -> Result<Vec<SourceDocument>> {
    let mut docs: Vec<SourceDocument> = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    for source in sources {
        for doc in discover_source(source)? {
            if let Some(first) = seen.get(&doc.source_key) {
                bail!(
                    "{} and {} resolve to the same document key '{}'; give their sources distinct content_type values",
                    first.display(),
                    doc.path.display(),
                    doc.source_key
                );
            }
            seen.insert(doc.source_key.clone(), doc.path.clone());
            docs.push(doc);
        }
    }
    Ok(docs)
}

fn discover_source(source: &SourceConfig) -> Result<Vec<SourceDocument>> {
    let root = &source.root;
    if !root.exists() {
        bail!("Indexing source root does not exist: {}", root.display());
    }

    let include_set = build_globset(&source.include_globs)?;
    let exclude_set = build_globset(&source.exclude_globs)?;
    let layout_name = match source.layout {
        SourceLayout::Localized => "localized",
        SourceLayout::Typed => "typed",
    };

    let mut docs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        // Only `<group>/<file>` is meaningful for either layout.
        let parts: Vec<&str> = rel_str.split('/').collect();
        let [group, file_name] = parts.as_slice() else {
            tracing::debug!(path = %rel_str, "skipping file outside <group>/<file> layout");
            continue;
        };
        if source.layout == SourceLayout::Typed && file_name.starts_with('_') {
            continue;
        }
        let Some(slug) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };

        let content_type = match source.layout {
            SourceLayout::Localized => source.content_type.clone(),
            SourceLayout::Typed => group.to_string(),
        };

        docs.push(SourceDocument {
            path: path.to_path_buf(),
            source_key: format!("{}:{}:{}", layout_name, content_type, rel_str),
            slug,
            layout: source.layout,
            group: group.to_string(),
            content_type,
            default_locale: source.default_locale.clone(),
        });
    }

    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Per-document failure kept in the summary.
#[derive(Debug, Clone, Serialize)]
pub struct IndexFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSummary {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub by_locale: BTreeMap<String, usize>,
    pub by_content_type: BTreeMap<String, usize>,
    pub errors: Vec<IndexFailure>,
}

impl IndexSummary {
    fn count_indexed(&mut self, record: &EmbeddingRecord) {
        self.indexed += 1;
        *self.by_locale.entry(record.locale.clone()).or_default() += 1;
        *self
            .by_content_type
            .entry(record.content_type.clone())
            .or_default() += 1;
    }

    fn fail(&mut self, path: &Path, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(path = %path.display(), %message, "document failed to index");
        self.failed += 1;
        self.errors.push(IndexFailure {
            path: path.display().to_string(),
            message,
        });
    }
}

/// A document after cleaning, ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDocument {
    pub id: String,
    pub slug: String,
    pub locale: String,
    pub content_type: String,
    /// Leading `max_embed_chars` characters of the cleaned body.
    pub text: String,
    pub attributes: Value,
}

/// Outcome of preparing one document.
#[derive(Debug)]
pub enum Prepared {
    Ready(PreparedDocument),
    /// Cleaned body shorter than `min_chars`; carries the length.
    TooShort(usize),
}

pub struct IndexingPipeline {
    gateway: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    min_chars: usize,
    max_embed_chars: usize,
    batch_size: usize,
    default_author: Option<String>,
}

impl IndexingPipeline {
    pub fn new(
        gateway: Arc<dyn EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
        config: &IndexingConfig,
    ) -> Self {
        Self {
            gateway,
            index,
            min_chars: config.min_chars,
            max_embed_chars: config.max_embed_chars,
            batch_size: config.batch_size.max(1),
            default_author: config.default_author.clone(),
        }
    }

    /// Turn raw file content into a [`PreparedDocument`], or report it as too short.
    pub fn prepare(&self, doc: &SourceDocument, raw: &str) -> Prepared {
        let (fm, body) = extract_front_matter(raw);
        let cleaned = clean_markup(&body);
        let length = cleaned.chars().count();
        if length < self.min_chars {
            return Prepared::TooShort(length);
        }

        let field = |key: &str| fm.get(key).cloned().unwrap_or_default();
        let title = fm
            .get("title")
            .filter(|t| !t.is_empty())
            .cloned()
            .unwrap_or_else(|| doc.slug.clone());
        let url = fallback_url(&doc.content_type, &doc.slug);

        let (locale, attributes) = match doc.layout {
            SourceLayout::Localized => {
                let author = fm
                    .get("author")
                    .filter(|a| !a.is_empty())
                    .cloned()
                    .or_else(|| self.default_author.clone())
                    .unwrap_or_default();
                (
                    doc.group.clone(),
                    json!({
                        "title": title,
                        "url": url,
                        "date": field("date"),
                        "tags": split_list(&field("tags")),
                        "category": field("category"),
                        "author": author,
                    }),
                )
            }
            SourceLayout::Typed => {
                let locale = fm
                    .get("locale")
                    .filter(|l| !l.is_empty())
                    .cloned()
                    .unwrap_or_else(|| doc.default_locale.clone());
                let doc_type = fm
                    .get("type")
                    .filter(|t| !t.is_empty())
                    .cloned()
                    .unwrap_or_else(|| doc.content_type.clone());
                (
                    locale,
                    json!({
                        "title": title,
                        "url": url,
                        "type": doc_type,
                        "status": field("status"),
                        "company": field("company"),
                        "targetPosition": field("targetPosition"),
                    }),
                )
            }
        };

        Prepared::Ready(PreparedDocument {
            id: record_id(&doc.source_key),
            slug: doc.slug.clone(),
            locale,
            content_type: doc.content_type.clone(),
            text: cleaned.chars().take(self.max_embed_chars).collect(),
            attributes,
        })
    }

    /// Index `docs`. With `dry_run`, documents are read and cleaned but
    /// nothing is embedded or written; `indexed` counts what would be.
    pub async fn run(&self, docs: &[SourceDocument], dry_run: bool) -> IndexSummary {
        let mut summary = IndexSummary::default();
        let mut batch: Vec<(PathBuf, EmbeddingRecord)> = Vec::with_capacity(self.batch_size);

        for doc in docs {
            let raw = match std::fs::read_to_string(&doc.path) {
                Ok(raw) => raw,
                Err(e) => {
                    summary.fail(&doc.path, format!("read failed: {}", e));
                    continue;
                }
            };

            let prepared = match self.prepare(doc, &raw) {
                Prepared::Ready(p) => p,
                Prepared::TooShort(len) => {
                    tracing::info!(path = %doc.path.display(), chars = len, "skipping short document");
                    summary.skipped += 1;
                    continue;
                }
            };

            if dry_run {
                summary.count_indexed(&to_record(prepared, Vec::new()));
                continue;
            }

            let vector = match self.gateway.embed_document(&prepared.text).await {
                Ok(v) => v,
                Err(e) => {
                    summary.fail(&doc.path, e.to_string());
                    continue;
                }
            };

            tracing::debug!(path = %doc.path.display(), id = %prepared.id, "embedded");
            batch.push((doc.path.clone(), to_record(prepared, vector)));
            if batch.len() >= self.batch_size {
                self.flush(&mut batch, &mut summary).await;
            }
        }

        self.flush(&mut batch, &mut summary).await;
        summary
    }

    /// Upsert the pending batch. If the batch is rejected, nothing from it
    /// was written, so each record is retried alone to isolate the failure.
    async fn flush(&self, batch: &mut Vec<(PathBuf, EmbeddingRecord)>, summary: &mut IndexSummary) {
        if batch.is_empty() {
            return;
        }
        let pending = std::mem::take(batch);
        let records: Vec<EmbeddingRecord> = pending.iter().map(|(_, r)| r.clone()).collect();

        match self.index.upsert(&records).await {
            Ok(_) => {
                for record in &records {
                    summary.count_indexed(record);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, size = records.len(), "batch upsert failed, retrying per document");
                for (path, record) in pending {
                    match self.index.upsert(std::slice::from_ref(&record)).await {
                        Ok(_) => summary.count_indexed(&record),
                        Err(e) => summary.fail(&path, e.to_string()),
                    }
                }
            }
        }
    }
}

fn to_record(prepared: PreparedDocument, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: prepared.id,
        slug: prepared.slug,
        vector,
        content: prepared.text,
        attributes: prepared.attributes,
        locale: prepared.locale,
        content_type: prepared.content_type,
        created_at: chrono::Utc::now().timestamp(),
    }
}

/// `blog-rag index`: run the pipeline over every configured source and
/// print the summary.
pub async fn run_index(config: &Config, dry_run: bool, clear: bool) -> Result<()> {
    if config.indexing.sources.is_empty() {
        bail!("No indexing sources configured. Add [[indexing.sources]] to the config file.");
    }
    if !dry_run && !config.embedding.is_enabled() {
        bail!("Indexing requires an embedding provider. Set [embedding] provider in the config.");
    }

    let docs = discover(&config.indexing.sources)?;
    let (pool, index) = crate::services::open_index(config).await?;
    let gateway = crate::embedding::create_gateway(&config.embedding)?;

    if clear && !dry_run {
        let removed = index.clear().await?;
        println!("cleared {} existing records", removed);
    }

    let pipeline = IndexingPipeline::new(gateway, index.clone(), &config.indexing);
    let summary = pipeline.run(&docs, dry_run).await;

    println!("index{}", if dry_run { " (dry-run)" } else { "" });
    println!("  documents found: {}", docs.len());
    println!("  indexed: {}", summary.indexed);
    println!("  skipped (too short): {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    for failure in &summary.errors {
        println!("    {}: {}", failure.path, failure.message);
    }
    println!();
    println!("  By locale:");
    for (locale, n) in &summary.by_locale {
        println!("    {}: {}", locale, n);
    }
    println!("  By content type:");
    for (content_type, n) in &summary.by_content_type {
        println!("    {}: {}", content_type, n);
    }

    if !dry_run {
        let stats = index.stats().await?;
        println!();
        println!("  Index now holds {} records", stats.total);
    }

    pool.close().await;
    Ok(())
}
