//! Answer streaming.
//!
//! [`GenerationOrchestrator::stream`] spawns one task per answer that
//! writes [`StreamEvent`]s into a bounded channel:
//!
//! ```text
//! sources (exactly one) → content (zero or more) → done (exactly one)
//! ```
//!
//! The returned [`ReceiverStream`] is the only handle to the answer.
//! Dropping it closes the channel; the task notices at its next await
//! point and stops pulling fragments from the backend.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use blog_rag_core::context::assemble;
use blog_rag_core::generation::{Generator, StreamEvent};
use blog_rag_core::locale::{build_prompt, generation_failed_message, Locale};
use blog_rag_core::models::Passage;

/// Events buffered between the generation task and the consumer.
pub const EVENT_BUFFER: usize = 16;

pub struct GenerationOrchestrator {
    generator: Arc<dyn Generator>,
    buffer: usize,
}

impl GenerationOrchestrator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            buffer: EVENT_BUFFER,
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Stream an answer to `query` grounded on `passages`.
    ///
    /// With no passages the stream is `sources([])` then `done`, and the
    /// generator is never called. A generator failure, at start or
    /// mid-stream, is reported as one localized apology `content` event.
    pub fn stream(
        &self,
        query: &str,
        locale: Locale,
        passages: Vec<Passage>,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let generator = self.generator.clone();
        let prompt = build_prompt(locale, &assemble(&passages), query);

        tokio::spawn(async move {
            let has_context = !passages.is_empty();
            if tx
                .send(StreamEvent::Sources { sources: passages })
                .await
                .is_err()
            {
                return;
            }

            if has_context && !forward_generation(generator.as_ref(), &prompt, locale, &tx).await {
                tracing::debug!("answer stream abandoned by consumer");
                return;
            }

            let _ = tx.send(StreamEvent::Done).await;
        });

        ReceiverStream::new(rx)
    }
}

/// Forward generated fragments as `content` events. Returns `false` if the
/// consumer went away, in which case nothing more should be sent.
async fn forward_generation(
    generator: &dyn Generator,
    prompt: &str,
    locale: Locale,
    tx: &mpsc::Sender<StreamEvent>,
) -> bool {
    let started = tokio::select! {
        _ = tx.closed() => return false,
        started = generator.generate(prompt) => started,
    };

    let mut fragments = match started {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(model = generator.model_name(), error = %e, "generation failed to start");
            return send_apology(tx, locale).await;
        }
    };

    let mut forwarded = 0usize;
    loop {
        let next = tokio::select! {
            _ = tx.closed() => return false,
            next = fragments.next() => next,
        };
        match next {
            Some(Ok(text)) => {
                if text.is_empty() {
                    continue;
                }
                forwarded += 1;
                if tx.send(StreamEvent::Content { content: text }).await.is_err() {
                    return false;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(
                    model = generator.model_name(),
                    forwarded,
                    error = %e,
                    "generation failed mid-stream"
                );
                return send_apology(tx, locale).await;
            }
            None => {
                tracing::debug!(forwarded, "generation finished");
                return true;
            }
        }
    }
}

async fn send_apology(tx: &mpsc::Sender<StreamEvent>, locale: Locale) -> bool {
    tx.send(StreamEvent::Content {
        content: generation_failed_message(locale).to_string(),
    })
    .await
    .is_ok()
}
