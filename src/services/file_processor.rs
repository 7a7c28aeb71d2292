use bytes::Bytes;
use moka::sync::Cache;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{DatasetProfile, PromptContext};
use crate::services::csv::{DatasetProfiler, SummaryCompressor};
use crate::services::file_storage::{BlobStore, StoredFile};
use crate::services::vector_index::{Metadata, SimilarityIndex};

/// What the server remembers about one processed upload.
#[derive(Debug)]
pub struct UploadRecord {
    pub file_name: String,
    pub profile: Arc<DatasetProfile>,
    pub summary: String,
    pub chunk_ids: Vec<String>,
}

/// Bounded map from file id to its processed upload.
#[derive(Clone)]
pub struct UploadRegistry {
    cache: Cache<String, Arc<UploadRecord>>,
}

impl UploadRegistry {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    pub fn insert(&self, file_id: &str, record: UploadRecord) {
        self.cache.insert(file_id.to_string(), Arc::new(record));
    }

    pub fn get(&self, file_id: &str) -> Option<Arc<UploadRecord>> {
        self.cache.get(file_id)
    }

    pub fn remove(&self, file_id: &str) -> Option<Arc<UploadRecord>> {
        self.cache.remove(file_id)
    }

    /// Prompt context derived from a registered upload's profile.
    pub fn context_for(&self, file_id: &str) -> Option<PromptContext> {
        self.get(file_id)
            .map(|record| PromptContext::from_profile(&record.profile, &record.summary))
    }
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub stored: StoredFile,
    pub profile: Arc<DatasetProfile>,
    pub summary: String,
    pub indexed_chunks: usize,
}

pub struct UploadPipeline {
    storage: Arc<dyn BlobStore>,
    index: Option<Arc<dyn SimilarityIndex>>,
    profiler: DatasetProfiler,
    compressor: SummaryCompressor,
    registry: UploadRegistry,
}

impl UploadPipeline {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        index: Option<Arc<dyn SimilarityIndex>>,
        profiler: DatasetProfiler,
        compressor: SummaryCompressor,
        registry: UploadRegistry,
    ) -> Self {
        Self {
            storage,
            index,
            profiler,
            compressor,
            registry,
        }
    }

    /// Save, profile, summarize and (when an index is configured) embed one
    /// upload. A profiling failure removes the saved file again; an indexing
    /// failure only leaves the upload unindexed.
    pub async fn process_upload(
        &self,
        content: Bytes,
        file_name: &str,
        metadata: Map<String, Value>,
    ) -> Result<UploadOutcome, AppError> {
        let start = Instant::now();
        let stored = self.storage.save(&content, file_name, metadata)?;

        let profile = match self.profiler.profile(&content) {
            Ok(profile) => Arc::new(profile),
            Err(e) => {
                warn!("Profiling {} failed, discarding upload: {}", file_name, e);
                self.storage.delete(&stored.file_id);
                return Err(e.into());
            }
        };
        let summary = self.compressor.summarize(&profile);

        let chunk_ids = match &self.index {
            Some(index) => self.index_chunks(index.as_ref(), &stored.file_id, &profile).await,
            None => Vec::new(),
        };
        let indexed_chunks = chunk_ids.len();

        self.registry.insert(
            &stored.file_id,
            UploadRecord {
                file_name: stored.original_filename.clone(),
                profile: Arc::clone(&profile),
                summary: summary.clone(),
                chunk_ids,
            },
        );

        info!("Upload {} processed in {:?}", stored.file_id, start.elapsed());
        Ok(UploadOutcome {
            stored,
            profile,
            summary,
            indexed_chunks,
        })
    }

    async fn index_chunks(
        &self,
        index: &dyn SimilarityIndex,
        file_id: &str,
        profile: &DatasetProfile,
    ) -> Vec<String> {
        let chunks = self.compressor.chunks_for_embedding(profile);
        let ids: Vec<String> = (0..chunks.len()).map(|i| format!("{}:{}", file_id, i)).collect();
        let metadatas: Vec<Metadata> = (0..chunks.len())
            .map(|i| chunk_metadata(file_id, i))
            .collect();

        match index.add(chunks, Some(metadatas), Some(ids)).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Indexing upload {} failed, continuing without embeddings: {}", file_id, e);
                Vec::new()
            }
        }
    }

    /// Removes the stored file, its index chunks and its registry entry.
    /// Returns whether anything was known about `file_id`.
    pub async fn delete_upload(&self, file_id: &str) -> Result<bool, AppError> {
        let removed_file = self.storage.delete(file_id);
        let record = self.registry.remove(file_id);

        if let Some(index) = &self.index {
            // Uploads from before a restart are no longer registered; match them by metadata.
            let removed_chunks = match &record {
                Some(record) => index.delete(&record.chunk_ids).await?,
                None => {
                    let mut filter = Metadata::new();
                    filter.insert("file_id".to_string(), json!(file_id));
                    index.delete_where(&filter).await?
                }
            };
            info!("Removed {} index chunks for {}", removed_chunks, file_id);
        }
        if let Some(record) = &record {
            info!("Forgot upload {} ({})", file_id, record.file_name);
        }

        Ok(removed_file || record.is_some())
    }
}

fn chunk_metadata(file_id: &str, chunk_index: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("file_id".to_string(), json!(file_id));
    metadata.insert("chunk_index".to_string(), json!(chunk_index));
    metadata
}
