// Image uploads on local disk, served back under /uploads

use chrono::Utc;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::core::errors::AppError;

/// Public URL prefix the upload directory is mounted at
pub const UPLOADS_PREFIX: &str = "/uploads";

const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub url: String,
    pub filename: String,
    pub size: usize,
}

pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    /// Create the directory if needed
    pub async fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Result<Self, AppError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::ConfigurationError(format!(
                "Cannot create upload directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir, max_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validate and write an uploaded image.
    ///
    /// Both the extension of `original_name` and the declared content type
    /// must name an allowed image format.
    pub async fn save(
        &self,
        original_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredFile, AppError> {
        let ext = image_extension(original_name, content_type)?;

        if bytes.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File too large. Maximum size is {} bytes",
                self.max_bytes
            )));
        }

        let filename = format!(
            "image-{}-{}.{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            ext
        );
        tokio::fs::write(self.dir.join(&filename), bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write upload: {}", e)))?;

        info!(filename = %filename, size = bytes.len(), "Image uploaded");

        Ok(StoredFile {
            url: format!("{}/{}", UPLOADS_PREFIX, filename),
            filename,
            size: bytes.len(),
        })
    }

    pub async fn delete(&self, filename: &str) -> Result<(), AppError> {
        if !is_safe_filename(filename) {
            return Err(AppError::BadRequest("Invalid filename".to_string()));
        }

        match tokio::fs::remove_file(self.dir.join(filename)).await {
            Ok(()) => {
                info!(filename = %filename, "Image deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound("File".to_string())),
            Err(e) => Err(AppError::Internal(format!("Failed to delete upload: {}", e))),
        }
    }
}

/// Normalized extension when name and content type agree on an allowed image type
fn image_extension(original_name: Option<&str>, content_type: Option<&str>) -> Result<String, AppError> {
    let invalid = || AppError::BadRequest("Only image files are allowed (jpeg, jpg, png, gif, webp)".to_string());

    let ext = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(invalid)?;

    let content_type = content_type.ok_or_else(invalid)?.to_lowercase();
    let matches = mime_guess::from_ext(&ext)
        .iter()
        .any(|mime| mime.essence_str() == content_type);
    if !matches {
        return Err(invalid());
    }

    Ok(ext)
}

fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains("..")
        && !filename.starts_with('.')
}
