//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` has defaults, so a minimal file only needs
//! the database path. Secrets (`GEMINI_API_KEY`) are read from the
//! environment by the backend adapters, never from this file.
//!
//! ```toml
//! [db]
//! path = "./data/rag.sqlite"
//!
//! [embedding]
//! provider = "gemini"
//! model = "text-embedding-004"
//! dims = 768
//!
//! [generation]
//! provider = "gemini"
//! model = "gemini-2.5-flash"
//!
//! [[indexing.sources]]
//! root = "./content/posts"
//! layout = "localized"
//!
//! [[indexing.sources]]
//! root = "./content/documents"
//! layout = "typed"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL override (Ollama, or a Gemini-compatible proxy).
    #[serde(default)]
    pub url: Option<String>,
    /// Prepended to texts embedded for indexing (Ollama only).
    #[serde(default)]
    pub document_prefix: Option<String>,
    /// Prepended to search queries before embedding (Ollama only).
    #[serde(default)]
    pub query_prefix: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Retries for rate-limited (429) or 5xx responses and network errors.
    /// Off by default.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: default_dims(),
            url: None,
            document_prefix: None,
            query_prefix: None,
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    0
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.95
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_generation_timeout() -> u64 {
    120
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Defaults for the chat path. The search endpoint takes its own
/// `top_k` / `min_similarity` per request.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_top_k() -> usize {
    blog_rag_core::retrieve::DEFAULT_TOP_K
}
fn default_min_similarity() -> f64 {
    blog_rag_core::retrieve::DEFAULT_MIN_SIMILARITY
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Cleaned bodies shorter than this (in characters) are skipped.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Only this many leading characters are embedded and stored.
    #[serde(default = "default_max_embed_chars")]
    pub max_embed_chars: usize,
    /// Records per upsert transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Author attribute for blog posts without one in front-matter.
    #[serde(default)]
    pub default_author: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_embed_chars: default_max_embed_chars(),
            batch_size: default_batch_size(),
            default_author: None,
            sources: Vec::new(),
        }
    }
}

fn default_min_chars() -> usize {
    50
}
fn default_max_embed_chars() -> usize {
    1000
}
fn default_batch_size() -> usize {
    32
}

/// How locale and content type are derived from a document's path.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceLayout {
    /// `<root>/<locale>/<slug>.mdx`; content type from `content_type`.
    Localized,
    /// `<root>/<content_type>/<slug>.mdx`; locale from front-matter.
    Typed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root: PathBuf,
    pub layout: SourceLayout,
    /// Content type for `localized` sources.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Locale for `typed` documents whose front-matter has none.
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_content_type() -> String {
    "blog".to_string()
}
fn default_locale() -> String {
    "ko".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.mdx".to_string(), "**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7073".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:7071".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        bail!("db.max_connections must be >= 1");
    }

    // Embedding
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, ollama, or local.",
            other
        ),
    }
    if config.embedding.provider == "ollama" && config.embedding.model.is_none() {
        bail!("embedding.model must be specified when provider is 'ollama'");
    }

    // Generation
    match config.generation.provider.as_str() {
        "disabled" | "gemini" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, gemini, or ollama.",
            other
        ),
    }
    if config.generation.provider == "ollama" && config.generation.model.is_none() {
        bail!("generation.model must be specified when provider is 'ollama'");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
        bail!("retrieval.min_similarity must be in [0.0, 1.0]");
    }

    // Indexing
    if config.indexing.max_embed_chars == 0 {
        bail!("indexing.max_embed_chars must be > 0");
    }
    if config.indexing.min_chars > config.indexing.max_embed_chars {
        bail!("indexing.min_chars must not exceed indexing.max_embed_chars");
    }
    if config.indexing.batch_size == 0 {
        bail!("indexing.batch_size must be > 0");
    }

    Ok(config)
}
