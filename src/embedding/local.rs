//! In-process embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first construction and
//! cached; afterwards no network calls are made. Inference runs on the
//! blocking thread pool.
//!
//! E5-family models expect `"passage: "` / `"query: "` prefixes, which are
//! used unless `embedding.document_prefix` / `embedding.query_prefix` are set.

use anyhow::bail;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use blog_rag_core::embedding::{check_dims, EmbedMode, EmbeddingGateway};
use blog_rag_core::{RagError, Result};

use crate::config::EmbeddingConfig;

const DEFAULT_LOCAL_MODEL: &str = "multilingual-e5-base";

pub struct LocalGateway {
    model_name: String,
    dims: usize,
    document_prefix: String,
    query_prefix: String,
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

impl LocalGateway {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let e5 = model_name.starts_with("multilingual-e5");
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(config_to_fastembed_model(&model_name)?)
                .with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        let default_prefix = |p: &str| if e5 { p.to_string() } else { String::new() };
        Ok(Self {
            dims: config.dims,
            document_prefix: config
                .document_prefix
                .clone()
                .unwrap_or_else(|| default_prefix("passage: ")),
            query_prefix: config
                .query_prefix
                .clone()
                .unwrap_or_else(|| default_prefix("query: ")),
            model_name,
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl EmbeddingGateway for LocalGateway {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        let prefix = match mode {
            EmbedMode::Document => &self.document_prefix,
            EmbedMode::Query => &self.query_prefix,
        };
        let input = vec![format!("{}{}", prefix, text)];
        let model = self.model.clone();

        let vector = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| RagError::Embedding("local model lock poisoned".into()))?;
            let mut out = model
                .embed(input, None)
                .map_err(|e| RagError::Embedding(format!("Local embedding failed: {}", e)))?;
            out.pop()
                .ok_or_else(|| RagError::Embedding("Local embedding returned nothing".into()))
        })
        .await
        .map_err(|e| RagError::Embedding(format!("Local embedding task failed: {}", e)))??;

        check_dims(self.dims, &vector)?;
        Ok(vector)
    }
}
