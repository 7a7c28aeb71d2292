use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::AppError;
use crate::services::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingOracle};

pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMatch {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// Embedding-backed document store queried by text.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Stores `documents`, returning their ids. When `ids` is `None` they are
    /// derived from position and content, so re-adding the same batch
    /// replaces it rather than duplicating it.
    async fn add(
        &self,
        documents: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<String>, AppError>;

    /// Top `k` matches per query text, best first. `filter` keeps only
    /// documents whose metadata contains every key/value pair given.
    async fn query(
        &self,
        query_texts: &[String],
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<Vec<IndexMatch>>, AppError>;

    async fn delete(&self, ids: &[String]) -> Result<usize, AppError>;

    /// Removes every document matching `filter`.
    async fn delete_where(&self, filter: &Metadata) -> Result<usize, AppError>;

    async fn count(&self) -> Result<usize, AppError>;
}

pub struct SqliteIndex {
    conn: Mutex<Connection>,
    embedder: Arc<dyn EmbeddingOracle>,
}

impl SqliteIndex {
    pub fn open(path: &Path, embedder: Arc<dyn EmbeddingOracle>) -> Result<Self, AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening similarity index at {}", path.display());
        let conn = Connection::open(path)?;
        Self::with_connection(conn, embedder)
    }

    pub fn open_in_memory(embedder: Arc<dyn EmbeddingOracle>) -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, embedder)
    }

    fn with_connection(conn: Connection, embedder: Arc<dyn EmbeddingOracle>) -> Result<Self, AppError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                id        TEXT PRIMARY KEY,
                document  TEXT NOT NULL,
                metadata  TEXT NOT NULL,
                embedding BLOB NOT NULL,
                model     TEXT NOT NULL
            );",
        )?;

        debug!("Similarity index ready (model {})", embedder.model_name());
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    /// Every stored row with its decoded metadata and embedding.
    fn load_rows(&self) -> Result<Vec<(String, String, Metadata, Vec<f32>)>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, document, metadata, embedding FROM chunks")?;
        let raw: Vec<(String, String, String, Vec<u8>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<_, _>>()?;

        raw.into_iter()
            .map(|(id, document, metadata, blob)| -> Result<_, AppError> {
                let metadata: Metadata = serde_json::from_str(&metadata)?;
                Ok((id, document, metadata, blob_to_vec(&blob)))
            })
            .collect()
    }
}

#[async_trait]
impl SimilarityIndex for SqliteIndex {
    async fn add(
        &self,
        documents: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<String>, AppError> {
        if let Some(metadatas) = &metadatas {
            if metadatas.len() != documents.len() {
                return Err(AppError::InvalidInput(format!(
                    "Got {} metadata entries for {} documents",
                    metadatas.len(),
                    documents.len()
                )));
            }
        }
        let ids = match ids {
            Some(ids) if ids.len() != documents.len() => {
                return Err(AppError::InvalidInput(format!(
                    "Got {} ids for {} documents",
                    ids.len(),
                    documents.len()
                )));
            }
            Some(ids) => ids,
            None => documents
                .iter()
                .enumerate()
                .map(|(i, doc)| generate_id(i, doc))
                .collect(),
        };
        if documents.is_empty() {
            return Ok(ids);
        }

        // Embed before taking the connection lock.
        let embeddings = self.embedder.embed(&documents).await?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chunks (id, document, metadata, embedding, model)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (i, (id, document)) in ids.iter().zip(&documents).enumerate() {
                let metadata = metadatas
                    .as_ref()
                    .map(|m| serde_json::to_string(&m[i]))
                    .transpose()?
                    .unwrap_or_else(|| "{}".to_string());
                stmt.execute(params![
                    id,
                    document,
                    metadata,
                    vec_to_blob(&embeddings[i]),
                    self.embedder.model_name()
                ])?;
            }
        }
        tx.commit()?;

        info!("Indexed {} documents", documents.len());
        Ok(ids)
    }

    async fn query(
        &self,
        query_texts: &[String],
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<Vec<IndexMatch>>, AppError> {
        if query_texts.is_empty() || k == 0 {
            return Ok(vec![Vec::new(); query_texts.len()]);
        }

        let query_vectors = self.embedder.embed(query_texts).await?;
        let rows: Vec<_> = self
            .load_rows()?
            .into_iter()
            .filter(|(_, _, metadata, _)| filter.map_or(true, |f| metadata_matches(metadata, f)))
            .collect();

        let results = query_vectors
            .iter()
            .map(|query| {
                let mut scored: Vec<IndexMatch> = rows
                    .iter()
                    .map(|(id, document, metadata, embedding)| IndexMatch {
                        id: id.clone(),
                        document: document.clone(),
                        metadata: metadata.clone(),
                        score: cosine_similarity(query, embedding),
                    })
                    .collect();
                scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
                scored.truncate(k);
                scored
            })
            .collect();

        Ok(results)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM chunks WHERE id = ?1")?;
            for id in ids {
                removed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;

        debug!("Deleted {} of {} requested documents", removed, ids.len());
        Ok(removed)
    }

    async fn delete_where(&self, filter: &Metadata) -> Result<usize, AppError> {
        let ids: Vec<String> = self
            .load_rows()?
            .into_iter()
            .filter(|(_, _, metadata, _)| metadata_matches(metadata, filter))
            .map(|(id, ..)| id)
            .collect();

        self.delete(&ids).await
    }

    async fn count(&self) -> Result<usize, AppError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Stable id for a document added without an explicit one.
pub fn generate_id(position: usize, document: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", position, document).as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(32);
    id
}

fn metadata_matches(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use serde_json::json;

    /// Maps text onto three letter-frequency axes: 'a', 'b', 'c'.
    struct LetterEmbedder;

    #[async_trait]
    impl EmbeddingOracle for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }

        fn batch_size(&self) -> usize {
            2
        }

        async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, OracleError> {
            Ok(batch
                .iter()
                .map(|t| {
                    ['a', 'b', 'c']
                        .iter()
                        .map(|l| t.chars().filter(|c| c == l).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn index() -> SqliteIndex {
        SqliteIndex::open_in_memory(Arc::new(LetterEmbedder)).unwrap()
    }

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let index = index();
        index
            .add(docs(&["aaaa", "bbbb", "cccc"]), None, Some(docs(&["a", "b", "c"])))
            .await
            .unwrap();

        let results = index.query(&docs(&["bbba"]), 2, None).await.unwrap();
        assert_eq!(results.len(), 1);
        let ids: Vec<&str> = results[0].iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(results[0][0].score > results[0][1].score);
    }

    #[tokio::test]
    async fn filter_restricts_matches() {
        let index = index();
        index
            .add(
                docs(&["aaaa", "aaab", "bbbb"]),
                Some(vec![
                    meta(json!({"file_id": "f1", "chunk_index": 0})),
                    meta(json!({"file_id": "f2", "chunk_index": 0})),
                    meta(json!({"file_id": "f1", "chunk_index": 1})),
                ]),
                Some(docs(&["f1:0", "f2:0", "f1:1"])),
            )
            .await
            .unwrap();

        let filter = meta(json!({"file_id": "f1"}));
        let results = index.query(&docs(&["aaaa"]), 10, Some(&filter)).await.unwrap();
        let ids: Vec<&str> = results[0].iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["f1:0", "f1:1"]);
        assert_eq!(results[0][0].metadata["chunk_index"], json!(0));
    }

    #[tokio::test]
    async fn generated_ids_are_stable() {
        let index = index();
        let first = index.add(docs(&["abc", "cab"]), None, None).await.unwrap();
        let second = index.add(docs(&["abc", "cab"]), None, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].len(), 32);
        assert_ne!(first[0], first[1]);
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_by_ids_and_filter() {
        let index = index();
        index
            .add(
                docs(&["a", "b", "c"]),
                Some(vec![
                    meta(json!({"file_id": "x"})),
                    meta(json!({"file_id": "y"})),
                    meta(json!({"file_id": "y"})),
                ]),
                Some(docs(&["1", "2", "3"])),
            )
            .await
            .unwrap();

        assert_eq!(index.delete(&docs(&["1", "missing"])).await.unwrap(), 1);
        assert_eq!(index.delete_where(&meta(json!({"file_id": "y"}))).await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mismatched_lengths_are_rejected() {
        let index = index();
        let err = index
            .add(docs(&["a", "b"]), None, Some(docs(&["only-one"])))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = index
            .add(docs(&["a"]), Some(vec![]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.sqlite3");
        let index = SqliteIndex::open(&path, Arc::new(LetterEmbedder)).unwrap();
        index.add(docs(&["abc"]), None, None).await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn generate_id_depends_on_position() {
        assert_ne!(generate_id(0, "doc"), generate_id(1, "doc"));
        assert_eq!(generate_id(3, "doc"), generate_id(3, "doc"));
    }
}
