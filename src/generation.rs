//! Streaming text generation backends.
//!
//! - **[`GeminiGenerator`]** calls `streamGenerateContent?alt=sse` and reads
//!   `data:` lines.
//! - **[`OllamaGenerator`]** calls `/api/generate` with `stream: true` and
//!   reads newline-delimited JSON.
//! - **[`DisabledGenerator`]** fails every request.
//!
//! Both HTTP backends share [`fragments`], which splits the response body
//! into lines on byte boundaries (so a multi-byte character split across
//! network chunks is never corrupted) and yields each non-empty text
//! fragment as soon as its line is complete.

use anyhow::bail;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use blog_rag_core::generation::{Generator, TextStream};
use blog_rag_core::{RagError, Result};

use crate::config::GenerationConfig;
use crate::embedding::{gemini_api_key, GEMINI_BASE_URL, OLLAMA_BASE_URL};

pub const GEMINI_DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

type ByteStream = BoxStream<'static, reqwest::Result<Vec<u8>>>;
type LineParser = fn(&str) -> Result<Option<String>>;

struct LineState {
    inner: ByteStream,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    parse: LineParser,
    finished: bool,
}

impl LineState {
    fn push_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match (self.parse)(line) {
            Ok(Some(text)) if !text.is_empty() => self.pending.push_back(Ok(text)),
            Ok(_) => {}
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

/// Turn a raw response body into a stream of text fragments, one parsed
/// line at a time. The stream ends after the first error.
pub(crate) fn fragments(inner: ByteStream, parse: LineParser) -> TextStream {
    let state = LineState {
        inner,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        parse,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    st.buffer.extend_from_slice(&bytes);
                    while let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = st.buffer.drain(..=pos).collect();
                        st.push_line(&line);
                        if st.finished {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending
                        .push_back(Err(RagError::Generation(format!("stream interrupted: {}", e))));
                }
                None => {
                    let rest = std::mem::take(&mut st.buffer);
                    st.push_line(&rest);
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn start_stream(request: reqwest::RequestBuilder, label: &str) -> Result<ByteStream> {
    let response = request
        .send()
        .await
        .map_err(|e| RagError::Generation(format!("{} connection error: {}", label, e)))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::Generation(format!(
            "{} API error {}: {}",
            label, status, body
        )));
    }
    Ok(response
        .bytes_stream()
        .map(|r| r.map(|b| b.to_vec()))
        .boxed())
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<TextStream> {
        Err(RagError::Generation("generation provider is disabled".into()))
    }
}

// ============ Gemini ============

/// Gemini chat model streamed over server-sent events.
///
/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiGenerator {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = match gemini_api_key() {
            Some(k) => k,
            None => bail!("GEMINI_API_KEY environment variable not set"),
        };
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_CHAT_MODEL.to_string()),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
        })
    }
}

/// Parse one SSE line of a `streamGenerateContent` response.
///
/// Non-`data:` lines are ignored. A `data:` payload carrying an `error`
/// object ends the stream with an error.
pub fn parse_gemini_sse_line(line: &str) -> Result<Option<String>> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let json: serde_json::Value = serde_json::from_str(payload.trim())
        .map_err(|e| RagError::Generation(format!("invalid Gemini event: {}", e)))?;

    if let Some(err) = json.get("error") {
        return Err(RagError::Generation(format!("Gemini error: {}", err)));
    }

    let text = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        });
    Ok(text)
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<TextStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "topP": self.top_p,
                "maxOutputTokens": self.max_output_tokens,
            },
        });
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let bytes = start_stream(request, "Gemini").await?;
        Ok(fragments(bytes, parse_gemini_sse_line))
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
        })
    }
}

/// Parse one NDJSON line of an `/api/generate` stream.
pub fn parse_ollama_line(line: &str) -> Result<Option<String>> {
    let json: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| RagError::Generation(format!("invalid Ollama chunk: {}", e)))?;
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        return Err(RagError::Generation(format!("Ollama error: {}", err)));
    }
    Ok(json
        .get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string))
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<TextStream> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": true,
            "options": {
                "temperature": self.temperature,
                "top_p": self.top_p,
                "num_predict": self.max_output_tokens,
            },
        });
        let request = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body);
        let bytes = start_stream(request, "Ollama").await?;
        Ok(fragments(bytes, parse_ollama_line))
    }
}

/// Create the [`Generator`] selected by `generation.provider`.
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
