//! Construction of the shared pipeline services.
//!
//! Every command and the HTTP server work against the same set of
//! explicitly constructed, `Arc`-shared components; nothing is a global.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use blog_rag_core::embedding::EmbeddingGateway;
use blog_rag_core::generation::Generator;
use blog_rag_core::retrieve::Retriever;
use blog_rag_core::store::VectorIndex;

use crate::config::Config;
use crate::db;
use crate::embedding::create_gateway;
use crate::generation::create_generator;
use crate::migrate::apply_schema;
use crate::orchestrator::GenerationOrchestrator;
use crate::sqlite_index::SqliteIndex;

#[derive(Clone)]
pub struct Services {
    pub index: Arc<dyn VectorIndex>,
    pub gateway: Arc<dyn EmbeddingGateway>,
    pub retriever: Arc<Retriever>,
    pub orchestrator: Arc<GenerationOrchestrator>,
}

impl Services {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        gateway: Arc<dyn EmbeddingGateway>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            retriever: Arc::new(Retriever::new(gateway.clone(), index.clone())),
            orchestrator: Arc::new(GenerationOrchestrator::new(generator)),
            index,
            gateway,
        }
    }
}

/// Connect to the configured database, ensure the schema, and wrap it as
/// a [`VectorIndex`].
pub async fn open_index(config: &Config) -> Result<(SqlitePool, Arc<dyn VectorIndex>)> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    let index = Arc::new(SqliteIndex::new(pool.clone(), config.embedding.dims));
    Ok((pool, index))
}

/// Build every service from configuration. The pool is returned so the
/// caller can close it on exit.
pub async fn from_config(config: &Config) -> Result<(SqlitePool, Services)> {
    let (pool, index) = open_index(config).await?;
    let gateway = create_gateway(&config.embedding)?;
    let generator = create_generator(&config.generation)?;
    Ok((pool, Services::new(index, gateway, generator)))
}
