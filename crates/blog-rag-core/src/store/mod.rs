//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage contract used by the
//! indexing pipeline and the retriever, enabling pluggable backends
//! (SQLite in the application crate, in-memory here).
//!
//! # Contract
//!
//! | Method | Guarantee |
//! |--------|-----------|
//! | [`upsert`](VectorIndex::upsert) | all records in the call are written, or none are |
//! | [`search`](VectorIndex::search) | filtered, floored, at most `top_k`, similarity desc then id asc |
//! | [`stats`](VectorIndex::stats) | all counts come from one snapshot |
//! | [`clear`](VectorIndex::clear) | removes every record |
//!
//! Implementations must be `Send + Sync` to be shared across requests.

pub mod memory;

use async_trait::async_trait;

use crate::embedding::check_dims;
use crate::error::{RagError, Result};
use crate::models::{EmbeddingRecord, IndexStats, SearchFilters, SearchHit};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimension every stored and queried vector must have.
    fn dims(&self) -> usize;

    /// Insert or fully replace records by `id`. Returns the number written.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<usize>;

    /// Cosine-similarity search over records matching `filters`.
    async fn search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filters: &SearchFilters,
        min_similarity: f64,
    ) -> Result<Vec<SearchHit>>;

    /// Total count plus counts by locale and content type.
    async fn stats(&self) -> Result<IndexStats>;

    /// Delete all records. Returns how many were removed.
    async fn clear(&self) -> Result<u64>;
}

/// Apply the similarity floor, order, and `top_k` bound to scored hits.
///
/// Ordering is similarity descending with ties broken by `id` ascending,
/// so the same inputs always produce the same output.
pub fn rank_hits(mut hits: Vec<SearchHit>, top_k: usize, min_similarity: f64) -> Vec<SearchHit> {
    hits.retain(|h| h.similarity >= min_similarity);
    hits.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    hits.truncate(top_k);
    hits
}

/// Reject a batch with an empty id or a wrong-sized vector before any
/// record is written.
pub fn validate_batch(dims: usize, records: &[EmbeddingRecord]) -> Result<()> {
    for r in records {
        if r.id.is_empty() {
            return Err(RagError::invalid("id", "record id must not be empty"));
        }
        check_dims(dims, &r.vector)?;
    }
    Ok(())
}
