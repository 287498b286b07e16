//! End-to-end indexing over a temporary content tree, with a keyword-based
//! embedding gateway so results are predictable.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use blog_rag::config::{parse_config, Config};
use blog_rag::ingest::{discover, IndexingPipeline};
use blog_rag::services;
use blog_rag_core::embedding::{EmbedMode, EmbeddingGateway};
use blog_rag_core::models::{record_id, SearchFilters};
use blog_rag_core::retrieve::{RetrievalParams, Retriever};
use blog_rag_core::store::VectorIndex;
use blog_rag_core::{RagError, Result};

/// Embeds by topic keyword: rust, cooking, or anything else.
struct KeywordGateway;

#[async_trait]
impl EmbeddingGateway for KeywordGateway {
    fn model_name(&self) -> &str {
        "keyword"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        if lower.contains("explode") {
            return Err(RagError::Embedding("backend returned 500".into()));
        }
        if lower.contains("wrongdims") {
            return Ok(vec![1.0, 0.0]);
        }
        if lower.contains("rust") {
            Ok(vec![1.0, 0.0, 0.0])
        } else if lower.contains("cooking") || lower.contains("요리") {
            Ok(vec![0.0, 1.0, 0.0])
        } else {
            Ok(vec![0.0, 0.0, 1.0])
        }
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup(batch_size: usize) -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write(
        root,
        "posts/en/rust-async.mdx",
        "---\ntitle: Async Rust in practice\ndate: 2024-03-01\ntags: rust, async\n---\n\
         <Callout>note</Callout>\nThis post walks through async Rust, executors and pinning in detail.\n\n\n\
         ```rust\nfn main() {}\n```\n![diagram](/img/a.png)\n",
    );
    write(
        root,
        "posts/ko/cooking.mdx",
        "---\ntitle: 주말 요리\nauthor: 민수\n---\n주말마다 새로운 요리를 해보는 이야기입니다. 오늘은 김치찌개를 만들었습니다. 맛있었어요. 다음 주에는 된장찌개에 도전해 볼 생각입니다.",
    );
    // 49 and 50 characters after cleaning.
    write(root, "posts/en/short.mdx", &"x".repeat(49));
    write(root, "posts/en/exact.mdx", &"y".repeat(50));
    write(
        root,
        "posts/en/broken.mdx",
        "This document makes the embedding backend explode every single time it is sent.",
    );
    write(
        root,
        "posts/en/mismatch.mdx",
        "This document comes back from the backend with wrongdims, a vector of the wrong size.",
    );
    write(root, "posts/README.md", &"not a post ".repeat(10));
    write(
        root,
        "documents/resume/backend.mdx",
        "---\ntitle: Backend Engineer Resume\nlocale: en\ncompany: Acme\ntargetPosition: Backend\nstatus: active\n---\n\
         Five years building Rust services, message queues and storage engines for production.",
    );
    write(
        root,
        "documents/resume/_draft.mdx",
        &"draft text that should never be indexed. ".repeat(3),
    );

    let config = parse_config(&format!(
        r#"[db]
path = "{root}/data/rag.sqlite"

[embedding]
dims = 3

[indexing]
batch_size = {batch_size}
default_author = "Blog Author"

[[indexing.sources]]
root = "{root}/posts"
layout = "localized"

[[indexing.sources]]
root = "{root}/documents"
layout = "typed"
"#,
        root = root.display(),
        batch_size = batch_size,
    ))
    .unwrap();

    (tmp, config)
}

#[test]
fn test_discover_respects_layouts() {
    let (_tmp, config) = setup(2);
    let docs = discover(&config.indexing.sources).unwrap();
    let slugs: Vec<_> = docs.iter().map(|d| d.slug.as_str()).collect();
    assert_eq!(
        slugs,
        vec!["broken", "exact", "mismatch", "rust-async", "short", "cooking", "backend"]
    );
    assert!(docs
        .iter()
        .filter(|d| d.group == "en" || d.group == "ko")
        .all(|d| d.content_type == "blog"));
    assert_eq!(docs.last().unwrap().content_type, "resume");
}

#[test]
fn test_missing_source_root_is_an_error() {
    let (tmp, mut config) = setup(2);
    config.indexing.sources[0].root = tmp.path().join("nope");
    assert!(discover(&config.indexing.sources).is_err());
}

#[tokio::test]
async fn test_pipeline_indexes_and_isolates_failures() {
    let (_tmp, config) = setup(2);
    let (pool, index) = services::open_index(&config).await.unwrap();
    let gateway: Arc<dyn EmbeddingGateway> = Arc::new(KeywordGateway);
    let pipeline = IndexingPipeline::new(gateway.clone(), index.clone(), &config.indexing);

    let docs = discover(&config.indexing.sources).unwrap();
    let summary = pipeline.run(&docs, false).await;

    assert_eq!(summary.indexed, 4, "errors: {:?}", summary.errors);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 2);
    let failed: Vec<_> = summary.errors.iter().map(|e| e.path.as_str()).collect();
    assert!(failed.iter().any(|p| p.ends_with("broken.mdx")));
    assert!(failed.iter().any(|p| p.ends_with("mismatch.mdx")));
    assert_eq!(summary.by_locale.get("en"), Some(&3));
    assert_eq!(summary.by_locale.get("ko"), Some(&1));
    assert_eq!(summary.by_content_type.get("resume"), Some(&1));

    let stats = index.stats().await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_content_type.get("blog"), Some(&3));

    let retriever = Retriever::new(gateway, index.clone());
    let passages = retriever
        .retrieve(
            "how does rust async work",
            Some("en"),
            &RetrievalParams {
                content_type: Some("blog".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(passages[0].slug, "rust-async");
    assert_eq!(passages[0].title, "Async Rust in practice");
    assert!(!passages[0].excerpt.contains("Callout"));
    assert!(!passages[0].excerpt.contains("fn main"));

    let ko = retriever
        .retrieve("요리 이야기", Some("ko"), &RetrievalParams::default())
        .await
        .unwrap();
    assert_eq!(ko.len(), 1);
    assert_eq!(ko[0].locale, "ko");

    pool.close().await;
}

#[tokio::test]
async fn test_reindex_updates_in_place() {
    let (tmp, config) = setup(8);
    let (pool, index) = services::open_index(&config).await.unwrap();
    let gateway: Arc<dyn EmbeddingGateway> = Arc::new(KeywordGateway);
    let pipeline = IndexingPipeline::new(gateway, index.clone(), &config.indexing);

    let docs = discover(&config.indexing.sources).unwrap();
    pipeline.run(&docs, false).await;
    let before = index.stats().await.unwrap().total;

    write(
        tmp.path(),
        "posts/en/rust-async.mdx",
        "---\ntitle: Async Rust, revised\n---\nA rewritten post about async Rust and structured concurrency patterns.",
    );
    let summary = pipeline.run(&docs, false).await;
    assert_eq!(summary.indexed, 4);
    assert_eq!(index.stats().await.unwrap().total, before);

    let hits = index
        .search(&[1.0, 0.0, 0.0], 10, &SearchFilters::locale("en"), 0.9)
        .await
        .unwrap();
    let post = hits
        .iter()
        .find(|h| h.record.id == record_id("localized:blog:en/rust-async.mdx"))
        .unwrap();
    assert_eq!(post.record.title(), Some("Async Rust, revised"));

    pool.close().await;
}

#[tokio::test]
async fn test_attributes_by_layout() {
    let (_tmp, config) = setup(2);
    let (pool, index) = services::open_index(&config).await.unwrap();
    let pipeline = IndexingPipeline::new(Arc::new(KeywordGateway), index.clone(), &config.indexing);
    let docs = discover(&config.indexing.sources).unwrap();
    pipeline.run(&docs, false).await;

    let hits = index
        .search(&[0.0, 1.0, 0.0], 1, &SearchFilters::locale("ko"), 0.5)
        .await
        .unwrap();
    assert_eq!(hits[0].record.attributes["author"], "민수");
    assert_eq!(hits[0].record.attributes["url"], "/catalog/cooking");

    let resume = index
        .search(
            &[1.0, 0.0, 0.0],
            1,
            &SearchFilters {
                locale: Some("en".into()),
                content_type: Some("resume".into()),
            },
            0.5,
        )
        .await
        .unwrap();
    let attrs = &resume[0].record.attributes;
    assert_eq!(attrs["company"], "Acme");
    assert_eq!(attrs["targetPosition"], "Backend");
    assert_eq!(attrs["type"], "resume");

    pool.close().await;
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let (_tmp, config) = setup(2);
    let (pool, index) = services::open_index(&config).await.unwrap();
    let pipeline = IndexingPipeline::new(Arc::new(KeywordGateway), index.clone(), &config.indexing);
    let docs = discover(&config.indexing.sources).unwrap();

    let summary = pipeline.run(&docs, true).await;
    assert_eq!(summary.indexed, 6);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(index.stats().await.unwrap().total, 0);

    pool.close().await;
}

fn two_localized_sources(tmp: &TempDir, second_content_type: &str) -> Config {
    let root = tmp.path();
    let body = "A post about rust that is long enough to clear the minimum length.";
    write(root, "posts/en/hello.mdx", &format!("---\ntitle: Blog hello\n---\n{}", body));
    write(root, "notes/en/hello.mdx", &format!("---\ntitle: Note hello\n---\n{}", body));
    parse_config(&format!(
        r#"[db]
path = "{root}/data/rag.sqlite"

[embedding]
dims = 3

[[indexing.sources]]
root = "{root}/posts"
layout = "localized"

[[indexing.sources]]
root = "{root}/notes"
layout = "localized"
content_type = "{second}"
"#,
        root = root.display(),
        second = second_content_type,
    ))
    .unwrap()
}

#[tokio::test]
async fn test_sources_sharing_a_relative_path_get_distinct_records() {
    let tmp = TempDir::new().unwrap();
    let config = two_localized_sources(&tmp, "note");
    let (pool, index) = services::open_index(&config).await.unwrap();
    let pipeline = IndexingPipeline::new(Arc::new(KeywordGateway), index.clone(), &config.indexing);

    let docs = discover(&config.indexing.sources).unwrap();
    assert_eq!(docs.len(), 2);
    assert_ne!(docs[0].source_key, docs[1].source_key);

    let summary = pipeline.run(&docs, false).await;
    assert_eq!(summary.indexed, 2);
    let stats = index.stats().await.unwrap();
    assert_eq!(stats.total, summary.indexed as i64);
    assert_eq!(stats.by_content_type.get("blog"), Some(&1));
    assert_eq!(stats.by_content_type.get("note"), Some(&1));

    pool.close().await;
}

#[test]
fn test_sources_that_would_share_a_record_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = two_localized_sources(&tmp, "blog");
    let err = discover(&config.indexing.sources).unwrap_err();
    assert!(err.to_string().contains("same document key"));
}
