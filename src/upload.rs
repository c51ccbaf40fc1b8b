use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use axum::http::StatusCode;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Name of the multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const MAX_FILE_NAME_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Content-Type must be multipart/form-data")]
    NotMultipart,
    #[error("No file uploaded")]
    MissingFile,
    #[error("File size too large (limit {limit} bytes)")]
    TooLarge { limit: u64 },
    #[error("Malformed upload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An uploaded file spooled to the scratch directory.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    file_name: String,
    content_type: Option<String>,
    size: u64,
}

impl TempUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.path).await
    }

    /// Deletes the spooled file. Failures are logged and otherwise ignored.
    pub async fn discard(self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "temporary upload removed"),
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove temporary upload"
            ),
        }
    }
}

/// Streams the first `image` field of `multipart` into `scratch_dir`,
/// aborting once more than `max_bytes` have arrived.
pub async fn receive_image(
    multipart: &mut Multipart,
    scratch_dir: &Path,
    max_bytes: u64,
) -> Result<TempUpload, UploadError> {
    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(UploadError::MissingFile),
            Err(err) => return Err(multipart_error(err, max_bytes)),
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("").to_string();
        let content_type = field.content_type().map(str::to_string);
        let file_name = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(&original_name));
        fs::create_dir_all(scratch_dir).await?;
        let path = scratch_dir.join(&file_name);
        let mut file = fs::File::create(&path).await?;

        let mut size: u64 = 0;
        let outcome = loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    size += chunk.len() as u64;
                    if size > max_bytes {
                        break Err(UploadError::TooLarge { limit: max_bytes });
                    }
                    if let Err(err) = file.write_all(&chunk).await {
                        break Err(err.into());
                    }
                }
                Ok(None) => break file.flush().await.map_err(UploadError::from),
                Err(err) => break Err(multipart_error(err, max_bytes)),
            }
        };
        drop(file);

        if let Err(err) = outcome {
            if let Err(cleanup) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "failed to remove partial upload");
            }
            return Err(err);
        }

        tracing::info!(
            path = %path.display(),
            size,
            original_name = %original_name,
            "upload received"
        );
        return Ok(TempUpload {
            path,
            file_name,
            content_type,
            size,
        });
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError, max_bytes: u64) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge { limit: max_bytes }
    } else {
        UploadError::Malformed(err.body_text())
    }
}

/// Reduces a client-supplied file name to a safe single path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .take(MAX_FILE_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
