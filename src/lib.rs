pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::services::csv::{DatasetProfiler, SummaryCompressor};
use crate::services::embedding::{EmbeddingOracle, OpenAiEmbedder};
use crate::services::file_processor::{UploadPipeline, UploadRegistry};
use crate::services::file_storage::{BlobStore, FileStorage};
use crate::services::llm_agent::{OpenAiOracle, TextOracle};
use crate::services::query::QueryService;
use crate::services::session::SessionStore;
use crate::services::vector_index::{SimilarityIndex, SqliteIndex};

const REGISTRY_CAPACITY: u64 = 1_000;

/// Shared handles for the request handlers.
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn BlobStore>,
    pub index: Option<Arc<dyn SimilarityIndex>>,
    pub sessions: Arc<SessionStore>,
    pub registry: UploadRegistry,
    pub query_service: QueryService,
    pub pipeline: UploadPipeline,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let storage = FileStorage::new(&config.upload_dir)
            .with_context(|| format!("Failed to prepare upload dir {}", config.upload_dir.display()))?;
        let oracle = OpenAiOracle::new(config.openai_api_key.as_deref());
        if !oracle.is_configured() {
            tracing::warn!("OPENAI_API_KEY not set; questions will get a fixed fallback answer");
        }

        let index = if config.enable_embeddings {
            match OpenAiEmbedder::new(
                config.openai_api_key.as_deref(),
                &config.embedding_model,
                config.embedding_batch_size,
            ) {
                Ok(embedder) => {
                    let embedder: Arc<dyn EmbeddingOracle> = Arc::new(embedder);
                    let index = SqliteIndex::open(&config.index_path, embedder)
                        .with_context(|| format!("Failed to open index at {}", config.index_path.display()))?;
                    Some(Arc::new(index) as Arc<dyn SimilarityIndex>)
                }
                Err(e) => {
                    tracing::warn!("Embeddings disabled: {}", e);
                    None
                }
            }
        } else {
            tracing::info!("Embeddings disabled by configuration");
            None
        };

        Ok(Self::with_components(config, Arc::new(storage), index, Arc::new(oracle)))
    }

    /// Assembles the state from ready-made components.
    pub fn with_components(
        config: Config,
        storage: Arc<dyn BlobStore>,
        index: Option<Arc<dyn SimilarityIndex>>,
        oracle: Arc<dyn TextOracle>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let registry = UploadRegistry::new(REGISTRY_CAPACITY);

        let query_service = QueryService::new(
            oracle,
            Arc::clone(&sessions),
            index.clone(),
            registry.clone(),
            &config,
        );
        let pipeline = UploadPipeline::new(
            Arc::clone(&storage),
            index.clone(),
            DatasetProfiler::new(config.profiling.clone()),
            SummaryCompressor::new(config.profiling.chunk_row_limit),
            registry.clone(),
        );

        Self {
            config,
            storage,
            index,
            sessions,
            registry,
            query_service,
            pipeline,
        }
    }
}
