use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use thiserror::Error;

/// Failures of the profiling pipeline. Both are user-correctable.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("CSV file is empty")]
    EmptyInput,
    #[error("Unable to decode CSV input: {0}")]
    Decoding(String),
}

/// Failures reported by the text-generation and embedding oracles.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
    #[error("Oracle request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("File too large: {0}")]
    PayloadTooLarge(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Index error: {0}")]
    IndexError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::IndexError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Profile(_) => StatusCode::BAD_REQUEST,
            AppError::Oracle(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IndexError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
