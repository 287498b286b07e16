//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs next to their record.
//! Search narrows candidates with SQL on the indexed `locale` and
//! `content_type` columns, then scores them with brute-force cosine
//! similarity in Rust.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use blog_rag_core::embedding::{blob_to_vec, check_dims, cosine_similarity, vec_to_blob};
use blog_rag_core::models::{EmbeddingRecord, IndexStats, SearchFilters, SearchHit};
use blog_rag_core::store::{rank_hits, validate_batch, VectorIndex};
use blog_rag_core::{RagError, Result};

pub struct SqliteIndex {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Connectivity failures are reported as [`RagError::IndexUnavailable`];
/// everything else as [`RagError::Storage`].
fn map_sqlx(err: sqlx::Error) -> RagError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => RagError::IndexUnavailable(err.to_string()),
        other => RagError::Storage(other.to_string()),
    }
}

fn row_to_record(row: &SqliteRow) -> Result<EmbeddingRecord> {
    let metadata_json: String = row.try_get("metadata_json").map_err(map_sqlx)?;
    let blob: Vec<u8> = row.try_get("vector").map_err(map_sqlx)?;
    Ok(EmbeddingRecord {
        id: row.try_get("id").map_err(map_sqlx)?,
        slug: row.try_get("slug").map_err(map_sqlx)?,
        vector: blob_to_vec(&blob),
        content: row.try_get("content").map_err(map_sqlx)?,
        attributes: serde_json::from_str(&metadata_json).map_err(|e| {
            RagError::Storage(format!("corrupt metadata_json: {}", e))
        })?,
        locale: row.try_get("locale").map_err(map_sqlx)?,
        content_type: row.try_get("content_type").map_err(map_sqlx)?,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
    })
}

async fn count_by(
    conn: &mut sqlx::SqliteConnection,
    column: &str,
) -> Result<std::collections::BTreeMap<String, i64>> {
    let sql = format!(
        "SELECT {col} AS k, COUNT(*) AS n FROM embeddings GROUP BY {col}",
        col = column
    );
    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;
    let mut counts = std::collections::BTreeMap::new();
    for row in rows {
        let key: String = row.try_get("k").map_err(map_sqlx)?;
        let n: i64 = row.try_get("n").map_err(map_sqlx)?;
        counts.insert(key, n);
    }
    Ok(counts)
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        validate_batch(self.dims, records)?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.attributes)
                .map_err(|e| RagError::invalid("attributes", e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO embeddings (id, slug, content, metadata_json, vector, dims,
                                        locale, content_type, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    slug = excluded.slug,
                    content = excluded.content,
                    metadata_json = excluded.metadata_json,
                    vector = excluded.vector,
                    dims = excluded.dims,
                    locale = excluded.locale,
                    content_type = excluded.content_type,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&record.id)
            .bind(&record.slug)
            .bind(&record.content)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .bind(record.vector.len() as i64)
            .bind(&record.locale)
            .bind(&record.content_type)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(records.len())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filters: &SearchFilters,
        min_similarity: f64,
    ) -> Result<Vec<SearchHit>> {
        check_dims(self.dims, query_vec)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, slug, content, metadata_json, vector, locale, content_type, created_at
            FROM embeddings
            WHERE dims = ?1
              AND (?2 IS NULL OR locale = ?2)
              AND (?3 IS NULL OR content_type = ?3)
            "#,
        )
        .bind(self.dims as i64)
        .bind(filters.locale.as_deref())
        .bind(filters.content_type.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = row_to_record(row)?;
            let similarity = cosine_similarity(query_vec, &record.vector);
            hits.push(SearchHit { record, similarity });
        }

        Ok(rank_hits(hits, top_k, min_similarity))
    }

    async fn stats(&self) -> Result<IndexStats> {
        // One read transaction so the three counts agree with each other.
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let by_locale = count_by(&mut tx, "locale").await?;
        let by_content_type = count_by(&mut tx, "content_type").await?;

        tx.commit().await.map_err(map_sqlx)?;

        Ok(IndexStats {
            total,
            by_locale,
            by_content_type,
        })
    }

    async fn clear(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let result = sqlx::query("DELETE FROM embeddings")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}
