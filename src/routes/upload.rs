use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path as FsPath;
use std::sync::Arc;

use crate::{
    error::AppError,
    models::{ColumnProfile, DatasetProfile, InferredType},
    services::file_storage::FileEntry,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload_csv))
        .route("/upload/files", get(list_files))
        .route("/upload/files/:file_id", delete(delete_file))
}

#[derive(Debug, Serialize)]
pub struct ColumnStats {
    data_type: InferredType,
    total_cells: usize,
    non_empty_cells: usize,
    empty_cells: usize,
    unique_values_count: usize,
    sample_unique_values: Vec<String>,
}

impl From<&ColumnProfile> for ColumnStats {
    fn from(column: &ColumnProfile) -> Self {
        Self {
            data_type: column.inferred_type,
            total_cells: column.total_cells,
            non_empty_cells: column.non_empty_cells,
            empty_cells: column.empty_cells,
            unique_values_count: column.unique_count,
            sample_unique_values: column.sample_unique_values.to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DataSummary {
    total_rows: usize,
    total_columns: usize,
    headers: Vec<String>,
    column_stats: Map<String, Value>,
    summary: String,
}

impl DataSummary {
    fn new(profile: &DatasetProfile, summary: String) -> Result<Self, AppError> {
        let mut column_stats = Map::new();
        for column in &profile.column_profiles {
            column_stats.insert(column.name.clone(), serde_json::to_value(ColumnStats::from(column))?);
        }

        Ok(Self {
            total_rows: profile.total_rows,
            total_columns: profile.total_columns,
            headers: profile.headers.clone(),
            column_stats,
            summary,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    success: bool,
    message: String,
    file_id: String,
    file_name: String,
    file_size: usize,
    data_summary: DataSummary,
    indexed_chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    files: Vec<FileEntry>,
    total_count: usize,
}

#[derive(Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    description: Option<String>,
    tags: Vec<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Malformed multipart body", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| AppError::InvalidInput("No filename provided".to_string()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read upload", e))?;
                form.file = Some((file_name, data));
            }
            "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Invalid description", e))?;
                form.description = Some(text).filter(|t| !t.trim().is_empty());
            }
            "tags" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Invalid tags", e))?;
                form.tags = parse_tags(&text);
            }
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(form)
}

fn multipart_error(context: &str, err: MultipartError) -> AppError {
    classify_body_error(err.status(), format!("{}: {}", context, err.body_text()))
}

/// Bodies cut off by the request size limit are reported as too large.
fn classify_body_error(status: StatusCode, message: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::InvalidInput(message)
    }
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn validate_upload(file_name: &str, data: &[u8], max_file_size: usize) -> Result<(), AppError> {
    let extension = FsPath::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if extension != "csv" {
        return Err(AppError::InvalidInput(format!(
            "Invalid file type. Expected CSV, got {}",
            if extension.is_empty() { "none".to_string() } else { extension.to_uppercase() }
        )));
    }
    if data.is_empty() {
        return Err(AppError::InvalidInput("Empty file".to_string()));
    }
    if data.len() > max_file_size {
        return Err(AppError::PayloadTooLarge(format!(
            "{} bytes exceeds the {} byte limit",
            data.len(),
            max_file_size
        )));
    }
    Ok(())
}

async fn upload_csv(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let form = read_form(multipart).await?;
    let (file_name, data) = form
        .file
        .ok_or_else(|| AppError::InvalidInput("Missing 'file' field".to_string()))?;
    validate_upload(&file_name, &data, state.config.max_file_size)?;

    tracing::info!("Received upload {} ({} bytes)", file_name, data.len());

    let mut metadata = Map::new();
    metadata.insert("description".to_string(), json!(form.description));
    metadata.insert("tags".to_string(), json!(form.tags));
    metadata.insert("original_filename".to_string(), json!(file_name));

    let outcome = state.pipeline.process_upload(data, &file_name, metadata).await?;

    tracing::info!("Successfully uploaded and processed CSV: {}", file_name);
    Ok(Json(UploadResponse {
        success: true,
        message: "File uploaded and processed successfully".to_string(),
        file_id: outcome.stored.file_id,
        file_name: outcome.stored.original_filename,
        file_size: outcome.stored.file_size,
        data_summary: DataSummary::new(&outcome.profile, outcome.summary)?,
        indexed_chunks: outcome.indexed_chunks,
    }))
}

async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<FileListResponse>, AppError> {
    let files = state.storage.list()?;
    let total_count = files.len();
    Ok(Json(FileListResponse { files, total_count }))
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !state.pipeline.delete_upload(&file_id).await? {
        return Err(AppError::NotFound(format!("File {} not found", file_id)));
    }

    Ok(Json(json!({
        "message": format!("File {} deleted successfully", file_id)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_over_the_limit_maps_to_413() {
        let err = classify_body_error(StatusCode::PAYLOAD_TOO_LARGE, "Failed to read upload: length limit exceeded".into());
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = classify_body_error(StatusCode::BAD_REQUEST, "Malformed multipart body: bad boundary".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        assert_eq!(parse_tags(" sales, 2024 ,,q1 "), vec!["sales", "2024", "q1"]);
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn only_csv_extension_is_accepted() {
        assert!(validate_upload("data.CSV", b"a\n1\n", 100).is_ok());

        let err = validate_upload("data.xlsx", b"a", 100).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: Invalid file type. Expected CSV, got XLSX");

        assert!(matches!(validate_upload("noext", b"a", 100), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn empty_and_oversized_files_are_rejected() {
        assert!(matches!(validate_upload("a.csv", b"", 100), Err(AppError::InvalidInput(_))));
        assert!(matches!(
            validate_upload("a.csv", &[b'x'; 101], 100),
            Err(AppError::PayloadTooLarge(_))
        ));
    }
}
