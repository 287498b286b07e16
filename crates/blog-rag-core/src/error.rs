//! Typed failures shared by every stage of the pipeline.
//!
//! The application layer decides how each variant surfaces to a user:
//! [`RagError::InvalidInput`] becomes a 400, upstream failures become a 5xx
//! (or an in-band apology once a stream has started), and nothing here is
//! ever shown to the user verbatim.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// The vector index could not be reached (pool closed, I/O, timeout).
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// A vector's length does not match the index dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding backend failed or returned an unusable response.
    #[error("embedding backend error: {0}")]
    Embedding(String),

    /// The generation backend failed to start or broke mid-stream.
    #[error("generation backend error: {0}")]
    Generation(String),

    /// A caller-supplied value failed validation.
    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// The index rejected a statement for a reason other than connectivity.
    #[error("storage error: {0}")]
    Storage(String),
}

impl RagError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for failures of an external collaborator rather than the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RagError::IndexUnavailable(_) | RagError::Embedding(_) | RagError::Generation(_)
        )
    }
}
