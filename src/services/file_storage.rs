use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[<>:"/\\|?*]"#).expect("static filename pattern is valid")
});

const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub file_id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: PathBuf,
    pub file_size: usize,
    pub file_extension: String,
    pub upload_timestamp: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub filename: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub upload_directory: PathBuf,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
}

/// Persistent home for uploaded files, addressed by generated id.
pub trait BlobStore: Send + Sync {
    fn save(&self, content: &[u8], original_name: &str, metadata: Map<String, Value>) -> Result<StoredFile, AppError>;
    fn get_path(&self, file_id: &str) -> Option<PathBuf>;
    /// Returns whether a file was removed.
    fn delete(&self, file_id: &str) -> bool;
    fn list(&self) -> Result<Vec<FileEntry>, AppError>;
    fn storage_info(&self) -> Result<StorageInfo, AppError>;
}

pub struct FileStorage {
    upload_dir: PathBuf,
}

impl FileStorage {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let upload_dir = upload_dir.into();
        fs::create_dir_all(&upload_dir)?;
        info!("File storage initialized at: {}", upload_dir.display());
        Ok(Self { upload_dir })
    }

    fn stored_files(&self) -> Result<Vec<PathBuf>, AppError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.upload_dir)? {
            let path = entry?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl BlobStore for FileStorage {
    fn save(&self, content: &[u8], original_name: &str, metadata: Map<String, Value>) -> Result<StoredFile, AppError> {
        let file_id = Uuid::new_v4().to_string();
        let safe_name = sanitize_filename(original_name);
        let extension = Path::new(&safe_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_default();

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let stored_filename = if extension.is_empty() {
            format!("{}_{}", timestamp, file_id)
        } else {
            format!("{}_{}.{}", timestamp, file_id, extension)
        };
        let file_path = self.upload_dir.join(&stored_filename);

        fs::write(&file_path, content).map_err(|e| {
            error!("Error saving file {}: {}", original_name, e);
            AppError::from(e)
        })?;

        info!(
            "Saved file: {} -> {} ({} bytes)",
            original_name,
            stored_filename,
            content.len()
        );

        Ok(StoredFile {
            file_id,
            original_filename: original_name.to_string(),
            stored_filename,
            file_path,
            file_size: content.len(),
            file_extension: extension,
            upload_timestamp: Utc::now(),
            metadata,
        })
    }

    fn get_path(&self, file_id: &str) -> Option<PathBuf> {
        if file_id.is_empty() {
            return None;
        }

        let suffix = format!("_{}", file_id);
        self.stored_files().ok()?.into_iter().find(|path| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().ends_with(&suffix))
                .unwrap_or(false)
        })
    }

    fn delete(&self, file_id: &str) -> bool {
        let Some(path) = self.get_path(file_id) else {
            return false;
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted file: {}", path.display());
                true
            }
            Err(e) => {
                error!("Error deleting file {}: {}", path.display(), e);
                false
            }
        }
    }

    fn list(&self) -> Result<Vec<FileEntry>, AppError> {
        let mut files = Vec::new();
        for path in self.stored_files()? {
            match fs::metadata(&path) {
                Ok(meta) => files.push(FileEntry {
                    filename: path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                    size: meta.len(),
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    path,
                }),
                Err(e) => warn!("Error getting file info for {}: {}", path.display(), e),
            }
        }
        Ok(files)
    }

    fn storage_info(&self) -> Result<StorageInfo, AppError> {
        let files = self.list()?;
        let total_size_bytes: u64 = files.iter().map(|f| f.size).sum();

        Ok(StorageInfo {
            upload_directory: self.upload_dir.clone(),
            total_files: files.len(),
            total_size_bytes,
            total_size_mb: (total_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        })
    }
}

/// Replaces characters unsafe in file names with `_` and caps the length,
/// keeping the extension when the name has to be cut.
pub fn sanitize_filename(name: &str) -> String {
    let safe = UNSAFE_CHARS.replace_all(name, "_").into_owned();
    if safe.chars().count() <= MAX_FILENAME_LEN {
        return safe;
    }

    let (stem, ext) = match safe.rfind('.') {
        Some(dot) if dot > 0 => (&safe[..dot], &safe[dot..]),
        _ => (safe.as_str(), ""),
    };
    let keep = MAX_FILENAME_LEN.saturating_sub(ext.chars().count());
    let mut truncated: String = stem.chars().take(keep).collect();
    truncated.push_str(ext);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("uploads")).unwrap();
        (dir, storage)
    }

    #[test]
    fn save_then_find_by_id() {
        let (_dir, storage) = storage();
        let stored = storage.save(b"a,b\n1,2\n", "data.csv", Map::new()).unwrap();

        assert_eq!(stored.file_size, 8);
        assert_eq!(stored.file_extension, "csv");
        assert!(stored.stored_filename.ends_with(&format!("_{}.csv", stored.file_id)));
        assert_eq!(storage.get_path(&stored.file_id), Some(stored.file_path.clone()));
        assert_eq!(fs::read(&stored.file_path).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn delete_removes_file_once() {
        let (_dir, storage) = storage();
        let stored = storage.save(b"x", "x.csv", Map::new()).unwrap();

        assert!(storage.delete(&stored.file_id));
        assert!(!storage.delete(&stored.file_id));
        assert!(storage.get_path(&stored.file_id).is_none());
    }

    #[test]
    fn empty_or_unknown_id_finds_nothing() {
        let (_dir, storage) = storage();
        storage.save(b"x", "x.csv", Map::new()).unwrap();
        assert!(storage.get_path("").is_none());
        assert!(storage.get_path("nope").is_none());
    }

    #[test]
    fn list_and_storage_info() {
        let (_dir, storage) = storage();
        storage.save(b"12345", "a.csv", Map::new()).unwrap();
        storage.save(b"123", "b.csv", Map::new()).unwrap();

        let files = storage.list().unwrap();
        assert_eq!(files.len(), 2);

        let info = storage.storage_info().unwrap();
        assert_eq!(info.total_files, 2);
        assert_eq!(info.total_size_bytes, 8);
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename(r#"a<b>c:d"e/f\g|h?i*.csv"#), "a_b_c_d_e_f_g_h_i_.csv");
        assert_eq!(sanitize_filename("plain.csv"), "plain.csv");
    }

    #[test]
    fn sanitize_caps_length_keeping_extension() {
        let long = format!("{}.csv", "n".repeat(400));
        let safe = sanitize_filename(&long);
        assert_eq!(safe.chars().count(), 255);
        assert!(safe.ends_with(".csv"));
    }
}
