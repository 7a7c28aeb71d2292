//! Embedding oracle and vector helpers.
//!
//! [`EmbeddingOracle::embed`] splits its input into batches of
//! [`EmbeddingOracle::batch_size`] texts and concatenates the results, so the
//! output is the same whatever the batch size.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::OracleError;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    fn batch_size(&self) -> usize;

    /// Embeds one batch; must return exactly one vector per input, in order.
    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, OracleError>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OracleError> {
        let batch_size = self.batch_size().max(1);
        let total_batches = texts.len().div_ceil(batch_size);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(batch_size).enumerate() {
            let vectors = self.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(OracleError::Request(format!(
                    "Embedding batch returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            all_embeddings.extend(vectors);
            tracing::debug!("Processed embedding batch {}/{}", i + 1, total_batches);
        }

        Ok(all_embeddings)
    }
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    batch_size: usize,
    endpoint: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: Option<&str>, model: &str, batch_size: usize) -> Result<Self, OracleError> {
        let api_key = api_key
            .ok_or_else(|| OracleError::Unavailable("OPENAI_API_KEY is not configured".to_string()))?;

        Ok(Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            batch_size,
            endpoint: OPENAI_EMBEDDINGS_URL.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingOracle for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: batch,
            })
            .send()
            .await
            .map_err(|e| OracleError::Request(format!("Failed to reach embeddings API: {}", e)))?;

        if !response.status().is_success() {
            return Err(OracleError::Request(format!(
                "Embeddings API returned status {}",
                response.status()
            )));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Request(format!("Invalid embeddings response: {}", e)))?;

        body.data.sort_by_key(|row| row.index);
        Ok(body.data.into_iter().map(|row| row.embedding).collect())
    }
}

/// Little-endian `f32` bytes, four per component.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
