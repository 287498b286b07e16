//! Generation backend trait and the streamed answer protocol.
//!
//! A [`Generator`] turns a prompt into a lazy, finite, non-restartable
//! stream of text fragments. The application's orchestrator wraps that
//! stream into the three-phase [`StreamEvent`] sequence:
//!
//! ```text
//! sources (exactly one) → content (zero or more) → done (exactly one)
//! ```

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;

use crate::error::Result;
use crate::models::Passage;

/// Text fragments in the order the backend produced them.
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.5-flash"`).
    fn model_name(&self) -> &str;

    /// Start generating. Fragments are pulled lazily; dropping the stream
    /// abandons the generation.
    async fn generate(&self, prompt: &str) -> Result<TextStream>;
}

/// One event of an answer stream, serialized with a `type` tag:
///
/// ```json
/// {"type":"sources","sources":[...]}
/// {"type":"content","content":"..."}
/// {"type":"done"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Sources { sources: Vec<Passage> },
    Content { content: String },
    Done,
}

impl StreamEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}
