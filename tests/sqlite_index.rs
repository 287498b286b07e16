//! Behavioral contract of the SQLite vector index, against a real database
//! file in a temporary directory.

use serde_json::json;
use tempfile::TempDir;

use blog_rag::config::{parse_config, Config};
use blog_rag::sqlite_index::SqliteIndex;
use blog_rag::{db, migrate};
use blog_rag_core::models::{EmbeddingRecord, IndexStats, SearchFilters};
use blog_rag_core::store::VectorIndex;
use blog_rag_core::RagError;

fn test_config(tmp: &TempDir) -> Config {
    parse_config(&format!(
        r#"[db]
path = "{}/data/rag.sqlite"

[embedding]
dims = 2
"#,
        tmp.path().display()
    ))
    .unwrap()
}

async fn open(tmp: &TempDir) -> SqliteIndex {
    let config = test_config(tmp);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    SqliteIndex::new(pool, 2)
}

fn rec(id: &str, locale: &str, content_type: &str, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        id: id.into(),
        slug: format!("{}-slug", id),
        vector,
        content: format!("content of {}", id),
        attributes: json!({ "title": id.to_uppercase(), "tags": ["rust"] }),
        locale: locale.into(),
        content_type: content_type.into(),
        created_at: 1_700_000_000,
    }
}

#[tokio::test]
async fn test_two_document_scenario() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[
            rec("a", "en", "blog", vec![1.0, 0.0]),
            rec("b", "en", "blog", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    let hits = index
        .search(&[1.0, 0.0], 5, &SearchFilters::locale("en"), 0.3)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "a");
    assert!((hits[0].similarity - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_record_round_trips_through_storage() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    let original = rec("a", "ko", "resume", vec![0.25, -0.5]);
    index.upsert(&[original.clone()]).await.unwrap();

    let hits = index
        .search(&[0.25, -0.5], 1, &SearchFilters::default(), 0.0)
        .await
        .unwrap();
    assert_eq!(hits[0].record, original);
}

#[tokio::test]
async fn test_locale_filter_is_hard() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[
            rec("a", "en", "blog", vec![1.0, 0.0]),
            rec("b", "ko", "blog", vec![1.0, 0.0]),
        ])
        .await
        .unwrap();

    let ko = index
        .search(&[1.0, 0.0], 5, &SearchFilters::locale("ko"), 0.0)
        .await
        .unwrap();
    assert_eq!(ko.len(), 1);
    assert_eq!(ko[0].record.locale, "ko");

    let fr = index
        .search(&[1.0, 0.0], 5, &SearchFilters::locale("fr"), -1.0)
        .await
        .unwrap();
    assert!(fr.is_empty());
}

#[tokio::test]
async fn test_floor_and_top_k() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[
            rec("a", "en", "blog", vec![1.0, 0.0]),
            rec("b", "en", "blog", vec![0.8, 0.6]),
            rec("c", "en", "blog", vec![0.6, 0.8]),
            rec("d", "en", "blog", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    let hits = index
        .search(&[1.0, 0.0], 10, &SearchFilters::default(), 0.5)
        .await
        .unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.record.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(hits.iter().all(|h| h.similarity >= 0.5));

    let top = index
        .search(&[1.0, 0.0], 2, &SearchFilters::default(), 0.0)
        .await
        .unwrap();
    assert_eq!(top.len(), 2);
    assert!(top[0].similarity >= top[1].similarity);
}

#[tokio::test]
async fn test_upsert_replaces_and_stats_delta() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[rec("a", "en", "blog", vec![1.0, 0.0])])
        .await
        .unwrap();
    assert_eq!(index.stats().await.unwrap().total, 1);

    let mut updated = rec("a", "ko", "resume", vec![0.0, 1.0]);
    updated.content = "rewritten".into();
    index.upsert(&[updated.clone()]).await.unwrap();

    let stats = index.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_locale.get("ko"), Some(&1));
    assert_eq!(stats.by_locale.get("en"), None);
    assert_eq!(stats.by_content_type.get("resume"), Some(&1));

    let hits = index
        .search(&[0.0, 1.0], 1, &SearchFilters::default(), 0.0)
        .await
        .unwrap();
    assert_eq!(hits[0].record.content, "rewritten");

    index
        .upsert(&[rec("b", "en", "blog", vec![1.0, 0.0])])
        .await
        .unwrap();
    assert_eq!(index.stats().await.unwrap().total, 2);
}

#[tokio::test]
async fn test_ties_break_by_id() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[
            rec("c", "en", "blog", vec![1.0, 0.0]),
            rec("a", "en", "blog", vec![3.0, 0.0]),
            rec("b", "en", "blog", vec![0.5, 0.0]),
        ])
        .await
        .unwrap();

    let first = index
        .search(&[1.0, 0.0], 10, &SearchFilters::default(), 0.0)
        .await
        .unwrap();
    let second = index
        .search(&[1.0, 0.0], 10, &SearchFilters::default(), 0.0)
        .await
        .unwrap();
    let ids: Vec<_> = first.iter().map(|h| h.record.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_bad_batch_is_rolled_back() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    let result = index
        .upsert(&[
            rec("a", "en", "blog", vec![1.0, 0.0]),
            rec("b", "en", "blog", vec![1.0, 0.0, 0.0]),
        ])
        .await;
    assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    assert_eq!(index.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_query_dimension_checked() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    let result = index
        .search(&[1.0, 0.0, 0.0], 5, &SearchFilters::default(), 0.0)
        .await;
    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}

#[tokio::test]
async fn test_content_type_filter_and_clear() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[
            rec("a", "en", "blog", vec![1.0, 0.0]),
            rec("b", "en", "resume", vec![1.0, 0.0]),
        ])
        .await
        .unwrap();
    let filters = SearchFilters {
        locale: None,
        content_type: Some("resume".into()),
    };
    let hits = index.search(&[1.0, 0.0], 5, &filters, 0.0).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "b");

    assert_eq!(index.clear().await.unwrap(), 2);
    assert_eq!(index.stats().await.unwrap(), IndexStats::default());
}

#[tokio::test]
async fn test_closed_pool_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index.pool().close().await;
    let result = index.stats().await;
    assert!(matches!(result, Err(RagError::IndexUnavailable(_))));
}

#[tokio::test]
async fn test_corrupt_metadata_is_a_storage_error() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[rec("a", "en", "blog", vec![1.0, 0.0])])
        .await
        .unwrap();
    sqlx::query("UPDATE embeddings SET metadata_json = '{not json' WHERE id = 'a'")
        .execute(index.pool())
        .await
        .unwrap();

    let result = index
        .search(&[1.0, 0.0], 5, &SearchFilters::default(), 0.0)
        .await;
    assert!(matches!(result, Err(RagError::Storage(_))));
}

#[tokio::test]
async fn test_clear_reports_removed_rows_and_index_stays_usable() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[
            rec("a", "en", "blog", vec![1.0, 0.0]),
            rec("b", "ko", "blog", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    assert_eq!(index.clear().await.unwrap(), 2);
    assert_eq!(index.clear().await.unwrap(), 0);

    index
        .upsert(&[rec("c", "en", "blog", vec![1.0, 0.0])])
        .await
        .unwrap();
    assert_eq!(index.stats().await.unwrap().total, 1);
}

#[tokio::test]
async fn test_similarity_is_not_widened_from_f32() {
    let tmp = TempDir::new().unwrap();
    let index = open(&tmp).await;
    index
        .upsert(&[rec("a", "en", "blog", vec![0.5, 0.5])])
        .await
        .unwrap();
    let hits = index
        .search(&[1.0, 0.0], 1, &SearchFilters::default(), 0.0)
        .await
        .unwrap();
    assert!((hits[0].similarity - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-15);
}
