//! Query-time retrieval.
//!
//! The [`Retriever`] embeds the query in query mode, searches the
//! [`VectorIndex`] with the locale filter and similarity floor, and maps
//! each hit to a display-ready [`Passage`].
//!
//! An empty result is returned as an empty list. Callers treat it as the
//! "no relevant content" outcome and must not start generation for it.
//! Index or embedding failures are returned as errors, never as an
//! empty list.

use std::sync::Arc;

use crate::embedding::EmbeddingGateway;
use crate::error::{RagError, Result};
use crate::models::{Passage, SearchFilters, SearchHit};
use crate::store::VectorIndex;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.3;
/// Excerpts longer than this many characters are cut and suffixed with [`ELLIPSIS`].
pub const EXCERPT_CHARS: usize = 200;
pub const ELLIPSIS: &str = "...";

/// Ranking knobs for a single retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub min_similarity: f64,
    pub content_type: Option<String>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            content_type: None,
        }
    }
}

pub struct Retriever {
    gateway: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(gateway: Arc<dyn EmbeddingGateway>, index: Arc<dyn VectorIndex>) -> Self {
        Self { gateway, index }
    }

    /// Retrieve the passages most similar to `query`.
    ///
    /// `locale`, when given, is a hard filter: records in any other locale
    /// are never returned, whatever their similarity.
    pub async fn retrieve(
        &self,
        query: &str,
        locale: Option<&str>,
        params: &RetrievalParams,
    ) -> Result<Vec<Passage>> {
        if query.trim().is_empty() {
            return Err(RagError::invalid("query", "must not be empty"));
        }

        let query_vec = self.gateway.embed_query(query).await?;
        let filters = SearchFilters {
            locale: locale.map(str::to_string),
            content_type: params.content_type.clone(),
        };
        let hits = self
            .index
            .search(&query_vec, params.top_k, &filters, params.min_similarity)
            .await?;

        Ok(hits.into_iter().map(to_passage).collect())
    }
}

/// Map a search hit to a passage, filling in title and URL defaults.
pub fn to_passage(hit: SearchHit) -> Passage {
    let record = hit.record;
    let title = record.title().unwrap_or(&record.slug).to_string();
    let url = record
        .url()
        .map(str::to_string)
        .unwrap_or_else(|| fallback_url(&record.content_type, &record.slug));
    Passage {
        excerpt: excerpt(&record.content),
        title,
        url,
        slug: record.slug,
        content_type: record.content_type,
        similarity: hit.similarity,
        locale: record.locale,
        content: record.content,
    }
}

/// URL used when a record carries none: blog posts live under
/// `/catalog/{slug}`, everything else under `/documents/{type}/{slug}`.
pub fn fallback_url(content_type: &str, slug: &str) -> String {
    if content_type == "blog" {
        format!("/catalog/{}", slug)
    } else {
        format!("/documents/{}/{}", content_type, slug)
    }
}

/// First [`EXCERPT_CHARS`] characters of `text`, plus [`ELLIPSIS`] when cut.
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}
