//! Embedding gateway implementations.
//!
//! Concrete [`EmbeddingGateway`] backends:
//! - **[`DisabledGateway`]** returns errors; used when embeddings are not configured.
//! - **[`GeminiGateway`]** calls the Gemini `embedContent` API with a
//!   task type per [`EmbedMode`] (`RETRIEVAL_DOCUMENT` / `RETRIEVAL_QUERY`).
//! - **[`OllamaGateway`]** calls a local Ollama instance's `/api/embed`
//!   endpoint, marking the mode with configurable text prefixes.
//! - **`LocalGateway`** runs a fastembed model in-process
//!   (`--features local-embeddings`).
//!
//! Every gateway checks the length of each returned vector against the
//! configured `embedding.dims` and fails with
//! [`RagError::DimensionMismatch`] instead of handing a wrong-sized vector
//! to the index.
//!
//! # Retry Strategy
//!
//! Retries are off unless `embedding.max_retries > 0`. When enabled, the
//! HTTP gateways retry transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

#[cfg(feature = "local-embeddings")]
mod local;

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use blog_rag_core::embedding::{check_dims, EmbedMode, EmbeddingGateway};
use blog_rag_core::{RagError, Result};

use crate::config::EmbeddingConfig;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Read the Gemini API key from the environment.
pub fn gemini_api_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
}

// ============ Disabled Gateway ============

/// A gateway that always fails. Used when `embedding.provider = "disabled"`.
pub struct DisabledGateway {
    dims: usize,
}

impl DisabledGateway {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingGateway for DisabledGateway {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, _text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
        Err(RagError::Embedding("embedding provider is disabled".into()))
    }
}

// ============ Shared HTTP helper ============

/// POST a JSON body with retry/backoff and return the parsed JSON response.
async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        RagError::Embedding(format!("{} returned invalid JSON: {}", label, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = RagError::Embedding(format!("{} API error {}: {}", label, status, body_text));
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(attempt, %status, "{} embedding request failed, retrying", label);
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "{} connection error", label);
                last_err = Some(RagError::Embedding(format!(
                    "{} connection error ({}): {}",
                    label, url, e
                )));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| RagError::Embedding(format!("{} embedding failed after retries", label))))
}

fn json_floats(values: &[serde_json::Value], label: &str) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RagError::Embedding(format!("{} response: non-numeric value", label)))
        })
        .collect()
}

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ============ Gemini Gateway ============

/// Embedding gateway using the Gemini API.
///
/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiGateway {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiGateway {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = match gemini_api_key() {
            Some(k) => k,
            None => bail!("GEMINI_API_KEY environment variable not set"),
        };
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_EMBED_MODEL.to_string()),
            dims: config.dims,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

pub fn gemini_task_type(mode: EmbedMode) -> &'static str {
    match mode {
        EmbedMode::Document => "RETRIEVAL_DOCUMENT",
        EmbedMode::Query => "RETRIEVAL_QUERY",
    }
}

/// Extract `embedding.values` from an `embedContent` response.
pub fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let values = json
        .get("embedding")
        .and_then(|e| e.get("values"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            RagError::Embedding("Invalid Gemini response: missing embedding.values".into())
        })?;
    json_floats(values, "Gemini")
}

#[async_trait]
impl EmbeddingGateway for GeminiGateway {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
            "taskType": gemini_task_type(mode),
        });
        let json = post_json(
            &self.client,
            &url,
            &[("x-goog-api-key", self.api_key.as_str())],
            &body,
            self.max_retries,
            "Gemini",
        )
        .await?;
        let vector = parse_gemini_response(&json)?;
        check_dims(self.dims, &vector)?;
        Ok(vector)
    }
}

// ============ Ollama Gateway ============

/// Embedding gateway using a local Ollama instance.
///
/// Ollama has no task-type parameter, so the mode is expressed through
/// `embedding.document_prefix` / `embedding.query_prefix` (for example
/// `"search_document: "` / `"search_query: "` for nomic-embed-text).
pub struct OllamaGateway {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    document_prefix: String,
    query_prefix: String,
    max_retries: u32,
}

impl OllamaGateway {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            document_prefix: config.document_prefix.clone().unwrap_or_default(),
            query_prefix: config.query_prefix.clone().unwrap_or_default(),
            max_retries: config.max_retries,
        })
    }

    fn prefixed(&self, text: &str, mode: EmbedMode) -> String {
        let prefix = match mode {
            EmbedMode::Document => &self.document_prefix,
            EmbedMode::Query => &self.query_prefix,
        };
        format!("{}{}", prefix, text)
    }
}

/// Extract the first vector of `embeddings` from an `/api/embed` response.
pub fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            RagError::Embedding("Invalid Ollama response: missing embeddings array".into())
        })?;
    json_floats(first, "Ollama")
}

#[async_trait]
impl EmbeddingGateway for OllamaGateway {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [self.prefixed(text, mode)],
        });
        let json = post_json(
            &self.client,
            &format!("{}/api/embed", self.url),
            &[],
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        let vector = parse_ollama_response(&json)?;
        check_dims(self.dims, &vector)?;
        Ok(vector)
    }
}

/// Create the [`EmbeddingGateway`] selected by `embedding.provider`.
///
/// | Config Value | Gateway |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledGateway`] |
/// | `"gemini"` | [`GeminiGateway`] |
/// | `"ollama"` | [`OllamaGateway`] |
/// | `"local"` | `LocalGateway` (requires `--features local-embeddings`) |
pub fn create_gateway(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGateway::new(config.dims))),
        "gemini" => Ok(Arc::new(GeminiGateway::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGateway::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(local::LocalGateway::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a probe text and fail if the backend's vectors do not have the
/// configured dimension. Run once at startup, before any request is served.
pub async fn verify_dims(gateway: &dyn EmbeddingGateway) -> Result<()> {
    let probe = gateway.embed_query("dimension probe").await?;
    check_dims(gateway.dims(), &probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_gemini_response() {
        let json = json!({ "embedding": { "values": [0.5, -1.0, 0.25] } });
        assert_eq!(parse_gemini_response(&json).unwrap(), vec![0.5, -1.0, 0.25]);
    }

    #[test]
    fn test_parse_gemini_response_missing_values() {
        let err = parse_gemini_response(&json!({ "error": "quota" })).unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({ "model": "nomic", "embeddings": [[1.0, 2.0], [3.0, 4.0]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_parse_ollama_response_empty() {
        assert!(parse_ollama_response(&json!({ "embeddings": [] })).is_err());
    }

    #[test]
    fn test_task_type_per_mode() {
        assert_eq!(gemini_task_type(EmbedMode::Document), "RETRIEVAL_DOCUMENT");
        assert_eq!(gemini_task_type(EmbedMode::Query), "RETRIEVAL_QUERY");
    }

    #[test]
    fn test_ollama_prefixes() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            model: Some("nomic-embed-text".into()),
            document_prefix: Some("search_document: ".into()),
            query_prefix: Some("search_query: ".into()),
            ..Default::default()
        };
        let gateway = OllamaGateway::new(&config).unwrap();
        assert_eq!(
            gateway.prefixed("hello", EmbedMode::Document),
            "search_document: hello"
        );
        assert_eq!(gateway.prefixed("hello", EmbedMode::Query), "search_query: hello");
    }

    #[tokio::test]
    async fn test_disabled_gateway_errors() {
        let gateway = create_gateway(&EmbeddingConfig::default()).unwrap();
        assert_eq!(gateway.model_name(), "disabled");
        assert_eq!(gateway.dims(), 768);
        let err = gateway.embed_query("hi").await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "cohere".into(),
            ..Default::default()
        };
        assert!(create_gateway(&config).is_err());
    }
}
