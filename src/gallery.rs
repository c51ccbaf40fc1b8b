//! Saving images into a user's gallery and reading the gallery back.
//!
//! A save writes the image file first and the record second. Every save gets
//! its own file, so when the record insert fails that file is deleted again
//! and no orphan is left behind.

use uuid::Uuid;

use crate::{
    error::ApiError,
    image_processing,
    routes::validate_http_url,
    storage::{
        ImageKind, ImageRecord, ImageRepository, ListFilter, LocalFileStorage,
        get_extension_from_mime_type,
    },
};

pub const UPLOADS_DIR: &str = "uploads";

#[derive(Clone, Debug)]
pub struct SavedImage {
    pub url: String,
    pub record: ImageRecord,
}

/// Stores `image_url` for `user_id`.
///
/// Remote URLs and paths of files already in the public directory are recorded
/// as they are. Anything else is treated as a data URI or bare base64 payload,
/// decoded and written under `uploads/`.
pub async fn save_image(
    records: &dyn ImageRepository,
    files: &LocalFileStorage,
    user_id: &str,
    image_url: &str,
    kind: ImageKind,
) -> Result<SavedImage, ApiError> {
    let image_url = image_url.trim();
    if image_url.is_empty() {
        return Err(ApiError::bad_request("No image data provided"));
    }

    if image_url.starts_with("http://") || image_url.starts_with("https://") {
        let url = validate_http_url(image_url)?.to_string();
        let record = insert_record(records, files, ImageRecord::new(user_id, &url, kind), None)
            .await?;
        return Ok(SavedImage { url, record });
    }

    if let Some(key) = LocalFileStorage::key_from_public_url(image_url) {
        if files.exists(key).await.unwrap_or(false) {
            let url = LocalFileStorage::public_url(key);
            let record = insert_record(records, files, ImageRecord::new(user_id, &url, kind), None)
                .await?;
            return Ok(SavedImage { url, record });
        }
    }

    let bytes = image_processing::decode_base64_image(image_url)
        .map_err(|err| ApiError::bad_request(format!("Invalid image data: {err}")))?;
    let ext = image_processing::detect_mime_type(&bytes)
        .map(get_extension_from_mime_type)
        .unwrap_or("jpg");
    let key = format!("{UPLOADS_DIR}/{kind}_{}.{ext}", Uuid::new_v4().simple());
    files
        .put_new(&key, &bytes)
        .await
        .map_err(|err| ApiError::internal("Failed to save image", err))?;

    let url = LocalFileStorage::public_url(&key);
    let record =
        insert_record(records, files, ImageRecord::new(user_id, &url, kind), Some(&key)).await?;
    tracing::info!(user = %user_id, kind = %kind, url = %url, size = bytes.len(), "image saved");
    Ok(SavedImage { url, record })
}

/// Inserts `record`; on failure deletes `written_key` (the file this save
/// created, if any).
pub async fn insert_record(
    records: &dyn ImageRepository,
    files: &LocalFileStorage,
    record: ImageRecord,
    written_key: Option<&str>,
) -> Result<ImageRecord, ApiError> {
    match records.insert(&record).await {
        Ok(()) => Ok(record),
        Err(err) => {
            if let Some(key) = written_key {
                match files.delete(key).await {
                    Ok(_) => tracing::info!(key, "removed file of failed save"),
                    Err(cleanup) => {
                        tracing::warn!(key, error = %cleanup, "failed to remove file of failed save")
                    }
                }
            }
            Err(ApiError::internal("Failed to save image record", err))
        }
    }
}

pub async fn list_images(
    records: &dyn ImageRepository,
    user_id: &str,
    filter: &ListFilter,
) -> Result<Vec<ImageRecord>, ApiError> {
    records
        .list_for_user(user_id, filter)
        .await
        .map_err(|err| ApiError::internal("Failed to fetch images from database", err))
}
