//! # blog-rag core
//!
//! Backend-agnostic logic for the blog-rag retrieval pipeline: embedding
//! records, the [`store::VectorIndex`] trait with an in-memory
//! implementation, the [`retrieve::Retriever`], context assembly, prompt
//! construction, and the streaming event types.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete backends (SQLite index, Gemini/Ollama adapters) and the
//! streaming orchestrator live in the `blog-rag` application crate.

pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod locale;
pub mod models;
pub mod retrieve;
pub mod store;

pub use error::{RagError, Result};
