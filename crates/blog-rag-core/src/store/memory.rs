//! In-memory [`VectorIndex`] implementation for tests and embedded use.
//!
//! Records live in a `BTreeMap` keyed by id behind `std::sync::RwLock`.
//! Search is brute-force cosine similarity over the filtered records.
//! Every operation takes the lock once, so `upsert` is all-or-nothing
//! and `stats` reads a single snapshot.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::{check_dims, cosine_similarity};
use crate::error::{RagError, Result};
use crate::models::{EmbeddingRecord, IndexStats, SearchFilters, SearchHit};

use super::{rank_hits, validate_batch, VectorIndex};

pub struct InMemoryIndex {
    dims: usize,
    records: RwLock<BTreeMap<String, EmbeddingRecord>>,
}

impl InMemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, EmbeddingRecord>>> {
        self.records
            .read()
            .map_err(|_| RagError::Storage("in-memory index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, EmbeddingRecord>>> {
        self.records
            .write()
            .map_err(|_| RagError::Storage("in-memory index lock poisoned".into()))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        validate_batch(self.dims, records)?;
        let mut stored = self.write()?;
        for r in records {
            stored.insert(r.id.clone(), r.clone());
        }
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
        let stored = self.read()?;
        let hits = stored
            .values()
            .filter(|r| filters.matches(r))
            .map(|r| SearchHit {
                similarity: cosine_similarity(query_vec, &r.vector),
                record: r.clone(),
            })
            .collect();
        Ok(rank_hits(hits, top_k, min_similarity))
    }

    async fn stats(&self) -> Result<IndexStats> {
        let stored = self.read()?;
        let mut stats = IndexStats {
            total: stored.len() as i64,
            ..Default::default()
        };
        for r in stored.values() {
            *stats.by_locale.entry(r.locale.clone()).or_insert(0) += 1;
            *stats.by_content_type.entry(r.content_type.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn clear(&self) -> Result<u64> {
        let mut stored = self.write()?;
        let removed = stored.len() as u64;
        stored.clear();
        Ok(removed)
    }
}
