use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Map;
use std::sync::Arc;
use tempfile::TempDir;

use csv_insights::config::Config;
use csv_insights::error::{AppError, OracleError, ProfileError};
use csv_insights::models::{InferredType, PromptContext};
use csv_insights::services::embedding::EmbeddingOracle;
use csv_insights::services::file_storage::FileStorage;
use csv_insights::services::llm_agent::{CompletionRequest, TextOracle};
use csv_insights::services::query::ORACLE_CONFIDENCE;
use csv_insights::services::vector_index::{SimilarityIndex, SqliteIndex};
use csv_insights::AppState;

const PEOPLE_CSV: &[u8] = b"name,age,joined\n\
ann,31,2021-01-04\n\
bob,42,2020-11-30\n\
cyd,27,\n";

/// Bag-of-bytes embedding: deterministic and good enough to rank.
struct ByteHistogramEmbedder;

#[async_trait]
impl EmbeddingOracle for ByteHistogramEmbedder {
    fn model_name(&self) -> &str {
        "byte-histogram"
    }

    fn batch_size(&self) -> usize {
        2
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, OracleError> {
        Ok(batch
            .iter()
            .map(|text| {
                let mut histogram = vec![0.0f32; 32];
                for b in text.bytes() {
                    histogram[(b % 32) as usize] += 1.0;
                }
                histogram
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingOracle {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextOracle for RecordingOracle {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, OracleError> {
        self.prompts.lock().push(request.user_prompt.to_string());
        Ok("There are 3 people.".to_string())
    }
}

struct Harness {
    _dir: TempDir,
    state: AppState,
    index: Arc<dyn SimilarityIndex>,
    oracle: Arc<RecordingOracle>,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let config = Config {
        upload_dir: dir.path().join("uploads"),
        ..Config::default()
    };

    let storage = Arc::new(FileStorage::new(&config.upload_dir).unwrap());
    let index: Arc<dyn SimilarityIndex> =
        Arc::new(SqliteIndex::open_in_memory(Arc::new(ByteHistogramEmbedder)).unwrap());
    let oracle = Arc::new(RecordingOracle::default());

    let state = AppState::with_components(config, storage, Some(Arc::clone(&index)), oracle.clone());
    Harness {
        _dir: dir,
        state,
        index,
        oracle,
    }
}

#[tokio::test]
async fn upload_profiles_summarizes_and_indexes() {
    let h = harness();

    let outcome = h
        .state
        .pipeline
        .process_upload(Bytes::from_static(PEOPLE_CSV), "people.csv", Map::new())
        .await
        .unwrap();

    let profile = &outcome.profile;
    assert_eq!(profile.headers, vec!["name", "age", "joined"]);
    assert_eq!(profile.total_rows, 3);
    assert_eq!(profile.total_columns, 3);
    assert_eq!(profile.column_profiles[1].inferred_type, InferredType::Numeric);
    assert_eq!(profile.column_profiles[2].inferred_type, InferredType::Date);
    assert_eq!(profile.column_profiles[2].empty_cells, 1);

    assert!(outcome.summary.contains("3 rows"));
    assert!(outcome.summary.contains("name, age, joined"));
    assert!(outcome.summary.contains("Data completeness"));

    // columns chunk + summary chunk + three row chunks
    assert_eq!(outcome.indexed_chunks, 5);
    assert_eq!(h.index.count().await.unwrap(), 5);
    assert_eq!(h.state.storage.list().unwrap().len(), 1);
}

#[tokio::test]
async fn question_about_an_upload_uses_its_profile() {
    let h = harness();
    let outcome = h
        .state
        .pipeline
        .process_upload(Bytes::from_static(PEOPLE_CSV), "people.csv", Map::new())
        .await
        .unwrap();
    let file_id = outcome.stored.file_id.clone();

    let answer = h
        .state
        .query_service
        .process_query("How many people joined?", None, Some("session-1"), Some(&file_id))
        .await
        .unwrap();

    assert_eq!(answer.text, "There are 3 people.");
    assert_eq!(answer.confidence, ORACLE_CONFIDENCE);
    assert_eq!(answer.sources.len(), 3);
    assert!(answer.sources.iter().all(|id| id.starts_with(&format!("{}:", file_id))));

    let prompts = h.oracle.prompts.lock();
    assert!(prompts[0].contains("Columns: name, age, joined"));
    assert!(prompts[0].contains("Total rows: 3"));
    assert!(prompts[0].contains("Summary: This dataset contains 3 rows"));
    drop(prompts);

    let history = h.state.sessions.get("session-1");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "How many people joined?");
}

#[tokio::test]
async fn explicit_context_wins_over_registered_profile() {
    let h = harness();
    let outcome = h
        .state
        .pipeline
        .process_upload(Bytes::from_static(PEOPLE_CSV), "people.csv", Map::new())
        .await
        .unwrap();

    let context = PromptContext {
        total_rows: Some(99),
        ..Default::default()
    };
    h.state
        .query_service
        .process_query("q", Some(context), None, Some(&outcome.stored.file_id))
        .await
        .unwrap();

    let prompts = h.oracle.prompts.lock();
    assert!(prompts[0].contains("Total rows: 99"));
    assert!(!prompts[0].contains("Columns:"));
}

#[tokio::test]
async fn delete_removes_file_chunks_and_registration() {
    let h = harness();
    let keep = h
        .state
        .pipeline
        .process_upload(Bytes::from_static(b"a,b\n1,2\n"), "keep.csv", Map::new())
        .await
        .unwrap();
    let drop_me = h
        .state
        .pipeline
        .process_upload(Bytes::from_static(PEOPLE_CSV), "people.csv", Map::new())
        .await
        .unwrap();
    assert_eq!(h.index.count().await.unwrap(), keep.indexed_chunks + drop_me.indexed_chunks);

    assert!(h.state.pipeline.delete_upload(&drop_me.stored.file_id).await.unwrap());

    assert_eq!(h.index.count().await.unwrap(), keep.indexed_chunks);
    assert!(h.state.registry.get(&drop_me.stored.file_id).is_none());
    assert!(h.state.registry.get(&keep.stored.file_id).is_some());
    assert!(h.state.storage.get_path(&drop_me.stored.file_id).is_none());
    assert!(!h.state.pipeline.delete_upload(&drop_me.stored.file_id).await.unwrap());
}

#[tokio::test]
async fn empty_upload_is_rejected_and_not_kept() {
    let h = harness();

    let err = h
        .state
        .pipeline
        .process_upload(Bytes::from_static(b"\n\n"), "empty.csv", Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Profile(ProfileError::EmptyInput)));
    assert!(h.state.storage.list().unwrap().is_empty());
    assert_eq!(h.index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn undecodable_upload_is_a_decoding_error() {
    let h = harness();

    let err = h
        .state
        .pipeline
        .process_upload(Bytes::from_static(b"a,b\n\xff\xfe,1\n"), "bad.csv", Map::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Profile(ProfileError::Decoding(_))));
}
