//! # blog-rag
//!
//! Retrieval-augmented question answering over a blog's posts and
//! documents.
//!
//! Markdown sources are embedded into a SQLite-backed vector index by an
//! offline indexer. At query time the question is embedded, the closest
//! passages in the reader's locale are retrieved, and a generation backend
//! streams an answer grounded in those passages over server-sent events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Markdown   │──▶│  Indexing    │──▶│   SQLite     │
//! │  sources    │   │  (embed)     │   │ vector index │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                   ┌──────────┐        ┌───────────┐
//!                   │   CLI    │        │ HTTP+SSE  │
//!                   │(blog-rag)│        │  server   │
//!                   └──────────┘        └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! blog-rag init
//! blog-rag index
//! blog-rag search "rust async" --locale en
//! blog-rag ask "What did the author learn about WASM?" --locale en
//! blog-rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_index`] | SQLite implementation of the vector index |
//! | [`embedding`] | Embedding backends (Gemini, Ollama, local) |
//! | [`generation`] | Streaming generation backends |
//! | [`orchestrator`] | Turns passages into a sources/content/done event stream |
//! | [`markup`] | Front-matter parsing and markup cleaning |
//! | [`ingest`] | Source discovery and the indexing pipeline |
//! | [`services`] | Wiring of the shared pipeline components |
//! | [`search`] | `search` command |
//! | [`ask`] | `ask` command |
//! | [`stats`] | `stats` and `clear` commands |
//! | [`server`] | HTTP API server |

pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod ingest;
pub mod markup;
pub mod migrate;
pub mod orchestrator;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_index;
pub mod stats;
