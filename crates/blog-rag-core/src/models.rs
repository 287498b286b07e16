//! Data types that flow through indexing and retrieval.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The unit of retrieval: one embedded document.
///
/// `id` is the upsert key. Re-indexing a document with the same `id`
/// replaces every other field; records are never partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    /// Human-stable identifier used in URLs. Not unique across content types.
    pub slug: String,
    pub vector: Vec<f32>,
    /// The text that was embedded (possibly truncated from the source).
    pub content: String,
    /// Open metadata: title, url, tags, date, author, ...
    pub attributes: serde_json::Value,
    pub locale: String,
    pub content_type: String,
    /// Unix timestamp (seconds) of when this version was written.
    pub created_at: i64,
}

impl EmbeddingRecord {
    fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        self.attribute_str("title")
    }

    pub fn url(&self) -> Option<&str> {
        self.attribute_str("url")
    }
}

/// Derive a stable record id from a source key (normally the document's
/// path relative to its source root).
///
/// The same key always yields the same id, so re-indexing updates in place.
pub fn record_id(source_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("rag_{}", &digest[..32])
}

/// A record matched by a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: EmbeddingRecord,
    /// Cosine similarity to the query vector, in `[-1, 1]`.
    pub similarity: f64,
}

/// Attribute filters applied before ranking. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub locale: Option<String>,
    pub content_type: Option<String>,
}

impl SearchFilters {
    pub fn locale(locale: impl Into<String>) -> Self {
        Self {
            locale: Some(locale.into()),
            content_type: None,
        }
    }

    pub fn matches(&self, record: &EmbeddingRecord) -> bool {
        self.locale.as_deref().map_or(true, |l| record.locale == l)
            && self
                .content_type
                .as_deref()
                .map_or(true, |t| record.content_type == t)
    }
}

/// Record counts taken from a single snapshot of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    #[serde(rename = "total_embeddings")]
    pub total: i64,
    pub by_locale: BTreeMap<String, i64>,
    pub by_content_type: BTreeMap<String, i64>,
}

/// A retrieved passage, ready for display and for context assembly.
///
/// Serializes to the shape used by both the `sources` stream event and
/// the search endpoint. The full `content` is kept for the context
/// assembler but not sent to clients; they receive `excerpt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub slug: String,
    pub title: String,
    pub url: String,
    pub content_type: String,
    pub similarity: f64,
    pub excerpt: String,
    pub locale: String,
    #[serde(skip)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(locale: &str, content_type: &str, attributes: serde_json::Value) -> EmbeddingRecord {
        EmbeddingRecord {
            id: "r1".into(),
            slug: "hello".into(),
            vector: vec![1.0, 0.0],
            content: "body".into(),
            attributes,
            locale: locale.into(),
            content_type: content_type.into(),
            created_at: 0,
        }
    }

    #[test]
    fn test_record_id_stable() {
        let a = record_id("blog/en/hello.mdx");
        let b = record_id("blog/en/hello.mdx");
        assert_eq!(a, b);
        assert!(a.starts_with("rag_"));
        assert_eq!(a.len(), 4 + 32);
        assert_ne!(a, record_id("blog/ko/hello.mdx"));
    }

    #[test]
    fn test_attribute_accessors_ignore_empty() {
        let r = record("en", "blog", json!({ "title": "", "url": "/catalog/hello" }));
        assert_eq!(r.title(), None);
        assert_eq!(r.url(), Some("/catalog/hello"));
    }

    #[test]
    fn test_filters() {
        let r = record("en", "resume", json!({}));
        assert!(SearchFilters::default().matches(&r));
        assert!(SearchFilters::locale("en").matches(&r));
        assert!(!SearchFilters::locale("fr").matches(&r));
        let f = SearchFilters {
            locale: Some("en".into()),
            content_type: Some("blog".into()),
        };
        assert!(!f.matches(&r));
    }

    #[test]
    fn test_passage_serialization_omits_content() {
        let p = Passage {
            slug: "s".into(),
            title: "T".into(),
            url: "/catalog/s".into(),
            content_type: "blog".into(),
            similarity: 0.5,
            excerpt: "e".into(),
            locale: "en".into(),
            content: "full text".into(),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert!(v.get("content").is_none());
        assert_eq!(v["excerpt"], "e");
    }

    #[test]
    fn test_stats_serialization_uses_total_embeddings() {
        let stats = IndexStats {
            total: 3,
            ..Default::default()
        };
        let v = serde_json::to_value(&stats).unwrap();
        assert_eq!(v["total_embeddings"], 3);
    }
}
